//! HTTP middleware

pub mod audit;
pub mod auth;
pub mod request_id;

pub use audit::audit_middleware;
pub use auth::require_token;
pub use request_id::request_id_middleware;
