//! HTTP resource handlers.

pub mod appointment;
pub mod child;
pub mod health;
pub mod patient;
pub mod search;
pub mod session;
pub mod stats;

use axum::{
    Router,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::AppState;
use crate::db::Db;
use crate::error::AppError;

/// Token-protected API routes; `/api/login` and `/health` stay outside.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/patient", get(patient::count).post(patient::create))
        .route(
            "/api/patient/{hn}",
            get(patient::read)
                .patch(patient::update)
                .delete(patient::remove),
        )
        .route(
            "/api/patient/{hn}/{child_type}",
            get(child::list).put(child::create),
        )
        .route(
            "/api/patient/{hn}/{child_type}/{record_id}",
            get(child::read).put(child::upsert).delete(child::remove),
        )
        .route("/api/appointment", get(appointment::on_date))
        .route("/api/search/is_existed", get(search::is_existed))
        .route("/api/search/field_entries", get(search::field_entries))
        .route("/api/stats", get(stats::document))
        .route("/api/logout", post(session::logout))
}

/// Hospital numbers may contain `/`; clients escape it as `^` in path
/// segments. The escape is reversible because `^` never occurs in an hn.
pub(crate) fn unescape_hn(segment: &str) -> String {
    segment.replace('^', "/")
}

/// Look up a patient row by hospital number, 404 when unknown.
pub(crate) fn find_patient(db: &Db, hn: &str) -> Result<Map<String, Value>, AppError> {
    if hn.is_empty() {
        return Err(AppError::BadRequest(
            "Hospital number must not be empty".to_string(),
        ));
    }
    db.fetch_by(
        &clinic_core::schema::PATIENT,
        "hn",
        &Value::String(hn.to_string()),
    )?
    .ok_or_else(|| AppError::NotFound(format!("Patient {} not found", hn)))
}

/// `?page=` query parameter shared by the paginated list endpoints.
#[derive(Debug, Deserialize, Default)]
pub(crate) struct Pagination {
    pub page: Option<i64>,
}

impl Pagination {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }
}

/// Total page count for a row count at the given page size.
pub(crate) fn page_count(total: i64, per_page: i64) -> i64 {
    if total == 0 { 0 } else { (total + per_page - 1) / per_page }
}
