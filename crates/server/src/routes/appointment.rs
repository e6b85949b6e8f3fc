//! Day-schedule endpoint: appointments joined with their patients.

use axum::{
    Json,
    extract::{Query, State},
};
use chrono::NaiveDate;
use clinic_core::{schema, serialize_row};
use serde::Deserialize;
use serde_json::{Value, json};

use super::page_count;
use crate::AppState;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct ScheduleParams {
    pub date: String,
    pub page: Option<i64>,
}

/// GET /api/appointment?date=&page= - Everyone booked on a given day.
pub async fn on_date(
    State(state): State<AppState>,
    Query(params): Query<ScheduleParams>,
) -> Result<Json<Value>, AppError> {
    if NaiveDate::parse_from_str(&params.date, "%Y-%m-%d").is_err() {
        return Err(AppError::BadRequest(
            "`date` must be an ISO-8601 date (YYYY-MM-DD)".to_string(),
        ));
    }

    let per_page = state.config.max_page_size;
    let page = params.page.unwrap_or(1).max(1);
    let (pairs, total) = state.db.appointments_on(&params.date, page, per_page)?;

    let items: Vec<Value> = pairs
        .into_iter()
        .map(|(patient, appointment)| {
            Ok(json!({
                "patient": serialize_row(&schema::PATIENT, patient)?,
                "appointment": serialize_row(&schema::APPOINTMENT, appointment)?,
            }))
        })
        .collect::<Result<_, AppError>>()?;

    Ok(Json(json!({
        "items": items,
        "page": page,
        "pages": page_count(total, per_page),
        "total": total,
        "perPage": per_page,
    })))
}
