//! Statistics endpoint.

use axum::{Json, extract::State};
use serde_json::Value;

use crate::AppState;
use crate::error::AppError;
use crate::report;

/// GET /api/stats - The full reporting document.
pub async fn document(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let doc = report::build(&state.db)?;
    Ok(Json(Value::Object(doc)))
}
