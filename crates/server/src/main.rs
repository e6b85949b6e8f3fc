//! clinic-server: HIV clinic records HTTP server binary entrypoint.

use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinic_server::config::Config;
use clinic_server::db::Db;
use clinic_server::{AppState, seed};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // The descriptor tables are static data; a typo in one of them is a
    // programming error, caught here before anything touches the store.
    clinic_core::schema::validate_all().expect("Inconsistent entity registry");

    // Load configuration
    let config = Config::from_env();
    if config.secret_key == "change-me-in-production" {
        tracing::warn!("SECRET_KEY not set, using the insecure default");
    }

    // Open the store
    let db = Db::open(&config.database_path).expect("Failed to open database");
    tracing::info!(path = %config.database_path, "Database opened");

    // Seed reference data before accepting any traffic.
    seed::run(&db, &config)
        .await
        .expect("Startup seeding failed");

    let addr: SocketAddr = config.bind_address.parse().expect("Invalid bind address");
    let app = clinic_server::build_app(AppState::new(db, config));

    tracing::info!("Starting clinic server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    tracing::info!("Server shutdown complete");
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
