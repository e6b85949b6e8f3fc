//! Lookup endpoints backing the registration and visit forms.

use axum::{
    Json,
    extract::{Query, State},
};
use clinic_core::schema;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::AppState;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct ExistsParams {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub query: String,
}

/// GET /api/search/is_existed?field=&query= - Duplicate check against one of
/// the patient's unique identity columns.
pub async fn is_existed(
    State(state): State<AppState>,
    Query(params): Query<ExistsParams>,
) -> Result<Json<Value>, AppError> {
    if !schema::PATIENT.unique.contains(&params.field.as_str()) {
        return Err(AppError::Unprocessable(format!(
            "`{}` is not a checkable field",
            params.field
        )));
    }

    let found = state
        .db
        .exists(&schema::PATIENT, &params.field, &params.query)?;
    Ok(Json(json!({ "result": found })))
}

#[derive(Debug, Deserialize)]
pub struct EntriesParams {
    #[serde(default)]
    pub field_name: String,
    #[serde(default)]
    pub query: String,
}

/// GET /api/search/field_entries?field_name=&query= - Autocomplete feeds.
///
/// `imp` searches the ICD-10 reference table, `search_bar` searches patient
/// identity columns, and the free-text fields return distinct stored values.
pub async fn field_entries(
    State(state): State<AppState>,
    Query(params): Query<EntriesParams>,
) -> Result<Json<Value>, AppError> {
    let limit = state.config.max_search_results;

    match params.field_name.as_str() {
        "imp" => {
            let hits = state.db.search_icd10(&params.query, limit)?;
            let entries: Vec<String> = hits
                .into_iter()
                .map(|(code, description)| format!("{}: {}", code, description))
                .collect();
            Ok(Json(json!({ "result": entries })))
        }
        "search_bar" => {
            let hits = state.db.search_patients(&params.query, limit)?;
            let entries: Vec<Value> = hits
                .into_iter()
                .map(|row| {
                    let name = row.get("name").and_then(Value::as_str).unwrap_or("");
                    let hn = row.get("hn").and_then(Value::as_str).unwrap_or("");
                    json!({ "label": format!("{} ({})", name, hn), "hn": hn })
                })
                .collect();
            Ok(Json(json!({ "result": entries })))
        }
        field => {
            let desc = match field {
                "refer_from" => &schema::PATIENT,
                "art_adherence_problem" | "why_switched_arv" => &schema::VISIT,
                "film_type" | "result" => &schema::IMAGING,
                "appointment_for" => &schema::APPOINTMENT,
                _ => {
                    return Err(AppError::Unprocessable(format!(
                        "`{}` is not a searchable field",
                        field
                    )));
                }
            };
            let values = state.db.distinct_values(desc, field, &params.query, limit)?;
            Ok(Json(json!({ "result": values })))
        }
    }
}
