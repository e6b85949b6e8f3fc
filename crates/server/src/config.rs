//! Server configuration

use std::time::Duration;

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub bind_address: String,
    /// HMAC secret for session tokens.
    pub secret_key: String,
    /// Session token lifetime.
    pub token_ttl: Duration,
    /// Fixed artificial delay applied to failed logins.
    pub login_delay: Duration,
    /// Maximum rows per page on list endpoints.
    pub max_page_size: i64,
    /// Result cap for the form-search endpoint.
    pub max_search_results: i64,
    pub cors_origins: Vec<String>,
    /// Credential seeded when the user table is empty.
    pub default_username: String,
    pub default_password: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            database_path: std::env::var("DATABASE_PATH").unwrap_or_else(|_| "clinic.db".into()),
            bind_address: std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            secret_key: std::env::var("SECRET_KEY")
                .unwrap_or_else(|_| "change-me-in-production".into()),
            token_ttl: Duration::from_secs(
                env_parse("TOKEN_TTL_SECS").unwrap_or(24 * 60 * 60),
            ),
            login_delay: Duration::from_millis(env_parse("LOGIN_DELAY_MS").unwrap_or(1000)),
            max_page_size: env_parse("MAX_PAGE_SIZE").unwrap_or(20),
            max_search_results: env_parse("MAX_SEARCH_RESULTS").unwrap_or(10),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["*".to_string()]),
            default_username: std::env::var("DEFAULT_USERNAME").unwrap_or_else(|_| "admin".into()),
            default_password: std::env::var("DEFAULT_PASSWORD").unwrap_or_else(|_| "admin".into()),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
