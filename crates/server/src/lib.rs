//! clinic-server library crate
//!
//! Exposes `build_app`, `config` and the store handle for integration
//! tests. The actual binary entrypoint is in `main.rs`.

pub mod auth;
pub mod config;
pub mod db;
mod error;
mod forms;
mod middleware;
mod report;
pub mod routes;
pub mod seed;

use std::sync::Arc;

use axum::{
    Router,
    middleware as axum_mw,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use auth::TokenService;
use config::Config;
use db::Db;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<Config>,
    pub tokens: TokenService,
}

impl AppState {
    pub fn new(db: Db, config: Config) -> Self {
        let tokens = TokenService::new(&config.secret_key, config.token_ttl);
        Self {
            db,
            config: Arc::new(config),
            tokens,
        }
    }
}

/// Build the full application router with all routes and middleware.
///
/// Extracted from `main()` so integration tests can construct the app
/// without binding to a TCP port.
pub fn build_app(state: AppState) -> Router {
    // Everything under /api except login requires a session token.
    let protected_routes = routes::api_routes().layer(axum_mw::from_fn_with_state(
        state.clone(),
        middleware::require_token,
    ));

    let public_routes = Router::new()
        .route("/health", get(routes::health::check))
        .route("/api/login", post(routes::session::login));

    // Build CORS layer
    let cors = if state.config.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = state
            .config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(axum_mw::from_fn(middleware::audit_middleware))
        .layer(axum_mw::from_fn(middleware::request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
