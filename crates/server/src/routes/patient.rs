//! Patient resource HTTP handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use clinic_core::{encode_json_fields, schema, serialize_row};
use serde_json::{Value, json};

use super::{find_patient, unescape_hn};
use crate::AppState;
use crate::error::AppError;

/// GET /api/patient - Total patient count.
pub async fn count(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let count = state.db.count(&schema::PATIENT)?;
    Ok(Json(json!({ "result": count })))
}

/// GET /api/patient/{hn} - Read a patient by hospital number.
pub async fn read(
    State(state): State<AppState>,
    Path(hn): Path<String>,
) -> Result<Json<Value>, AppError> {
    let hn = unescape_hn(&hn);
    let row = find_patient(&state.db, &hn)?;
    let patient = serialize_row(&schema::PATIENT, row)?;
    Ok(Json(json!({ "result": patient })))
}

/// POST /api/patient - Register a new patient.
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let mut data = crate::forms::validate(crate::forms::PATIENT_FORM, &body)?;

    // The natural key first, then every other declared unique column.
    let hn = data
        .get("hn")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if state.db.exists(&schema::PATIENT, "hn", &hn)? {
        return Err(AppError::Conflict(format!(
            "Patient {} already exists",
            hn
        )));
    }
    for &column in schema::PATIENT.unique {
        if column == "hn" {
            continue;
        }
        let value = data.get(column).and_then(Value::as_str).unwrap_or_default();
        if state.db.exists(&schema::PATIENT, column, value)? {
            return Err(AppError::Conflict(format!(
                "A patient with this {} already exists",
                column
            )));
        }
    }

    encode_json_fields(&schema::PATIENT, &mut data);
    state.db.insert(&schema::PATIENT, &data)?;

    tracing::info!(hn = %hn, "Patient created");
    Ok(Json(json!({ "result": "success" })))
}

/// PATCH /api/patient/{hn} - Full-replace update of an existing patient.
pub async fn update(
    State(state): State<AppState>,
    Path(hn): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let hn = unescape_hn(&hn);
    let mut data = crate::forms::validate(crate::forms::PATIENT_FORM, &body)?;

    // The hospital number is immutable; a body that names a different one
    // is a conflicting request, not an update.
    let body_hn = data.get("hn").and_then(Value::as_str).unwrap_or_default();
    if body_hn != hn {
        return Err(AppError::Conflict(
            "Hospital number in body does not match the record".to_string(),
        ));
    }

    let row = find_patient(&state.db, &hn)?;
    let id = row
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::Internal("Patient row without id".to_string()))?;

    let hn_value = Value::String(hn.clone());
    for &column in schema::PATIENT.unique {
        if column == "hn" {
            continue;
        }
        let Some(value) = data.get(column).filter(|v| !v.is_null()) else {
            continue;
        };
        if state
            .db
            .exists_excluding(&schema::PATIENT, column, value, "hn", &hn_value)?
        {
            return Err(AppError::Conflict(format!(
                "Another patient already has this {}",
                column
            )));
        }
    }

    encode_json_fields(&schema::PATIENT, &mut data);
    state.db.replace(&schema::PATIENT, id, &data)?;

    tracing::info!(hn = %hn, "Patient updated");
    Ok(Json(json!({ "result": "success" })))
}

/// DELETE /api/patient/{hn} - Remove a patient and, via the schema's
/// cascade, all of their child records.
pub async fn remove(
    State(state): State<AppState>,
    Path(hn): Path<String>,
) -> Result<Json<Value>, AppError> {
    let hn = unescape_hn(&hn);
    let row = find_patient(&state.db, &hn)?;
    let id = row.get("id").cloned().unwrap_or(Value::Null);

    state.db.delete_by(&schema::PATIENT, "id", &id)?;

    tracing::info!(hn = %hn, "Patient deleted");
    Ok(Json(json!({ "result": "success" })))
}
