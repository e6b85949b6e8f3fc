//! Per-patient child record handlers (visits, labs, imaging, appointments).
//!
//! All four families share one set of handlers; the `{child_type}` path
//! segment selects the descriptor and validation form.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use clinic_core::{EntityDescriptor, encode_json_fields, schema, serialize_row};
use serde_json::{Map, Value, json};

use super::{Pagination, find_patient, page_count, unescape_hn};
use crate::AppState;
use crate::error::AppError;
use crate::forms::{self, FieldSpec};

fn resolve(tag: &str) -> Result<&'static EntityDescriptor, AppError> {
    schema::child_descriptor(tag)
        .ok_or_else(|| AppError::NotFound(format!("Unknown record type `{}`", tag)))
}

fn form_for(desc: &EntityDescriptor) -> &'static [FieldSpec] {
    match desc.entity {
        "visit" => forms::VISIT_FORM,
        "lab" => forms::LAB_FORM,
        "imaging" => forms::IMAGING_FORM,
        _ => forms::APPOINTMENT_FORM,
    }
}

fn patient_key(row: &Map<String, Value>) -> Result<i64, AppError> {
    row.get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::Internal("Patient row without id".to_string()))
}

/// GET /api/patient/{hn}/{child_type} - One page of a patient's records,
/// oldest first.
pub async fn list(
    State(state): State<AppState>,
    Path((hn, child_type)): Path<(String, String)>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Value>, AppError> {
    let desc = resolve(&child_type)?;
    let patient = find_patient(&state.db, &unescape_hn(&hn))?;
    let patient_id = patient_key(&patient)?;

    let per_page = state.config.max_page_size;
    let page = pagination.page();
    let (rows, total) = state.db.list_children(desc, patient_id, page, per_page)?;

    let items: Vec<Value> = rows
        .into_iter()
        .map(|row| serialize_row(desc, row).map(Value::Object))
        .collect::<Result<_, _>>()?;

    Ok(Json(json!({
        "items": items,
        "page": page,
        "pages": page_count(total, per_page),
        "total": total,
        "perPage": per_page,
    })))
}

/// GET /api/patient/{hn}/{child_type}/{record_id} - A single record.
pub async fn read(
    State(state): State<AppState>,
    Path((hn, child_type, record_id)): Path<(String, String, i64)>,
) -> Result<Json<Value>, AppError> {
    let desc = resolve(&child_type)?;
    let patient = find_patient(&state.db, &unescape_hn(&hn))?;
    let patient_id = patient_key(&patient)?;

    let row = state
        .db
        .fetch_child(desc, patient_id, record_id)?
        .ok_or_else(|| {
            AppError::NotFound(format!("{} {} not found", desc.entity, record_id))
        })?;

    Ok(Json(json!({ "result": serialize_row(desc, row)? })))
}

/// PUT /api/patient/{hn}/{child_type} - Append a new record.
pub async fn create(
    State(state): State<AppState>,
    Path((hn, child_type)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let desc = resolve(&child_type)?;
    let patient = find_patient(&state.db, &unescape_hn(&hn))?;

    insert_record(&state, desc, patient_key(&patient)?, &body)
}

/// PUT /api/patient/{hn}/{child_type}/{record_id} - Update in place when the
/// record exists, append otherwise.
pub async fn upsert(
    State(state): State<AppState>,
    Path((hn, child_type, record_id)): Path<(String, String, i64)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let desc = resolve(&child_type)?;
    let patient = find_patient(&state.db, &unescape_hn(&hn))?;
    let patient_id = patient_key(&patient)?;

    match state.db.fetch_child(desc, patient_id, record_id)? {
        Some(_) => {
            let mut data = forms::validate(form_for(desc), &body)?;
            encode_json_fields(desc, &mut data);
            state.db.replace(desc, record_id, &data)?;

            tracing::info!(entity = desc.entity, record_id, "Record updated");
            Ok(Json(json!({ "result": "success" })))
        }
        None => insert_record(&state, desc, patient_id, &body),
    }
}

fn insert_record(
    state: &AppState,
    desc: &EntityDescriptor,
    patient_id: i64,
    body: &Value,
) -> Result<Json<Value>, AppError> {
    let mut data = forms::validate(form_for(desc), body)?;
    data.insert("patient_id".to_string(), Value::from(patient_id));
    encode_json_fields(desc, &mut data);

    let id = state.db.insert(desc, &data)?;
    tracing::info!(entity = desc.entity, record_id = id, "Record created");
    Ok(Json(json!({ "result": "success" })))
}

/// DELETE /api/patient/{hn}/{child_type}/{record_id}
pub async fn remove(
    State(state): State<AppState>,
    Path((hn, child_type, record_id)): Path<(String, String, i64)>,
) -> Result<Json<Value>, AppError> {
    let desc = resolve(&child_type)?;
    let patient = find_patient(&state.db, &unescape_hn(&hn))?;
    let patient_id = patient_key(&patient)?;

    if state.db.fetch_child(desc, patient_id, record_id)?.is_none() {
        return Err(AppError::NotFound(format!(
            "{} {} not found",
            desc.entity, record_id
        )));
    }

    state.db.delete_by(desc, "id", &Value::from(record_id))?;
    tracing::info!(entity = desc.entity, record_id, "Record deleted");
    Ok(Json(json!({ "result": "success" })))
}
