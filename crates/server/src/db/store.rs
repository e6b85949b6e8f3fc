//! Generic, descriptor-driven store operations.
//!
//! Every entity kind goes through the same handful of SQL routines; the
//! [`EntityDescriptor`] supplies table and column names. Column names are
//! only ever interpolated after being checked against the descriptor.

use chrono::Utc;
use clinic_core::{EntityDescriptor, TIMESTAMP_FORMAT, apply_update, serialize_row};
use rusqlite::params_from_iter;
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Map, Value};

use super::Db;
use crate::error::AppError;

fn now_text() -> String {
    Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        // Arrays/objects are encoded to JSON text before they reach the
        // store; this arm only fires if a caller skipped that step.
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
    }
}

fn row_to_map(row: &rusqlite::Row<'_>) -> Result<Map<String, Value>, rusqlite::Error> {
    let names: Vec<String> = row
        .as_ref()
        .column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();

    let mut map = Map::new();
    for (i, name) in names.into_iter().enumerate() {
        map.insert(name, from_sql(row.get_ref(i)?));
    }
    Ok(map)
}

fn ensure_column(desc: &EntityDescriptor, column: &str) -> Result<(), AppError> {
    if desc.has_column(column) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Unknown column `{}` for {}",
            column, desc.entity
        )))
    }
}

impl Db {
    /// Insert a validated, JSON-encoded body as a new row. Returns the id.
    pub fn insert(
        &self,
        desc: &EntityDescriptor,
        data: &Map<String, Value>,
    ) -> Result<i64, AppError> {
        let now = now_text();
        let mut columns: Vec<&str> = vec!["timestamp", "modify_timestamp"];
        let mut values: Vec<SqlValue> = vec![SqlValue::Text(now.clone()), SqlValue::Text(now)];

        for &col in desc.columns {
            if let Some(value) = data.get(col) {
                columns.push(col);
                values.push(to_sql(value));
            }
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            desc.table,
            columns.join(", "),
            placeholders
        );

        self.with(|conn| {
            conn.execute(&sql, params_from_iter(values.iter()))?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Fetch a single raw row by column equality.
    pub fn fetch_by(
        &self,
        desc: &EntityDescriptor,
        column: &str,
        value: &Value,
    ) -> Result<Option<Map<String, Value>>, AppError> {
        ensure_column(desc, column)?;
        let sql = format!(
            "SELECT * FROM \"{}\" WHERE {} = ? LIMIT 1",
            desc.table, column
        );

        self.with(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([to_sql(value)])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_map(row)?)),
                None => Ok(None),
            }
        })
    }

    /// Apply the generic full-replace update to the row with the given id.
    pub fn replace(
        &self,
        desc: &EntityDescriptor,
        id: i64,
        fields: &Map<String, Value>,
    ) -> Result<(), AppError> {
        let now = Utc::now().naive_utc();
        let select = format!("SELECT * FROM \"{}\" WHERE id = ? LIMIT 1", desc.table);

        self.with(|conn| {
            let mut current = {
                let mut stmt = conn.prepare(&select)?;
                let mut rows = stmt.query([SqlValue::Integer(id)])?;
                match rows.next()? {
                    Some(row) => row_to_map(row)?,
                    None => {
                        return Err(AppError::NotFound(format!(
                            "{} {} not found",
                            desc.entity, id
                        )));
                    }
                }
            };

            apply_update(desc, &mut current, fields, now);

            let mut assigns: Vec<String> = Vec::new();
            let mut values: Vec<SqlValue> = Vec::new();
            for &col in desc.columns {
                if desc.is_protected(col) {
                    continue;
                }
                assigns.push(format!("{} = ?", col));
                values.push(to_sql(current.get(col).unwrap_or(&Value::Null)));
            }
            assigns.push("modify_timestamp = ?".to_string());
            values.push(to_sql(
                current.get("modify_timestamp").unwrap_or(&Value::Null),
            ));
            values.push(SqlValue::Integer(id));

            let sql = format!(
                "UPDATE \"{}\" SET {} WHERE id = ?",
                desc.table,
                assigns.join(", ")
            );
            conn.execute(&sql, params_from_iter(values.iter()))?;
            Ok(())
        })
    }

    /// Delete rows by column equality. Returns the number of rows removed.
    pub fn delete_by(
        &self,
        desc: &EntityDescriptor,
        column: &str,
        value: &Value,
    ) -> Result<usize, AppError> {
        ensure_column(desc, column)?;
        let sql = format!("DELETE FROM \"{}\" WHERE {} = ?", desc.table, column);
        self.with(|conn| Ok(conn.execute(&sql, [to_sql(value)])?))
    }

    pub fn count(&self, desc: &EntityDescriptor) -> Result<i64, AppError> {
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", desc.table);
        self.with(|conn| Ok(conn.query_row(&sql, [], |row| row.get(0))?))
    }

    /// Whether any row has `column = value`.
    ///
    /// An empty column or value short-circuits to `false` rather than
    /// running a meaningless query.
    pub fn exists(
        &self,
        desc: &EntityDescriptor,
        column: &str,
        value: &str,
    ) -> Result<bool, AppError> {
        if column.is_empty() || value.is_empty() {
            return Ok(false);
        }
        ensure_column(desc, column)?;

        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM \"{}\" WHERE {} = ?)",
            desc.table, column
        );
        self.with(|conn| Ok(conn.query_row(&sql, [value], |row| row.get(0))?))
    }

    /// Uniqueness re-check for updates: does any *other* row (keyed by
    /// `key_column != key_value`) already hold `column = value`?
    pub fn exists_excluding(
        &self,
        desc: &EntityDescriptor,
        column: &str,
        value: &Value,
        key_column: &str,
        key_value: &Value,
    ) -> Result<bool, AppError> {
        ensure_column(desc, column)?;
        ensure_column(desc, key_column)?;

        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM \"{}\" WHERE {} = ? AND {} != ?)",
            desc.table, column, key_column
        );
        self.with(|conn| {
            Ok(conn.query_row(&sql, [to_sql(value), to_sql(key_value)], |row| row.get(0))?)
        })
    }

    /// Bulk-load a whole table in serialized form, for reporting.
    pub fn load_table(&self, desc: &EntityDescriptor) -> Result<Vec<Map<String, Value>>, AppError> {
        let sql = format!("SELECT * FROM \"{}\"", desc.table);
        self.with(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(serialize_row(desc, row_to_map(row)?)?);
            }
            Ok(out)
        })
    }

    /// One page of a patient's child rows, oldest first, plus the total.
    pub fn list_children(
        &self,
        desc: &EntityDescriptor,
        patient_id: i64,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<Map<String, Value>>, i64), AppError> {
        let offset = (page - 1) * per_page;
        let sql = format!(
            "SELECT * FROM \"{}\" WHERE patient_id = ? ORDER BY date ASC, id ASC LIMIT ? OFFSET ?",
            desc.table
        );
        let count_sql = format!(
            "SELECT COUNT(*) FROM \"{}\" WHERE patient_id = ?",
            desc.table
        );

        self.with(|conn| {
            let total: i64 = conn.query_row(&count_sql, [patient_id], |row| row.get(0))?;

            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([patient_id, per_page, offset])?;
            let mut items = Vec::new();
            while let Some(row) = rows.next()? {
                items.push(row_to_map(row)?);
            }
            Ok((items, total))
        })
    }

    /// A single child row scoped to its patient.
    pub fn fetch_child(
        &self,
        desc: &EntityDescriptor,
        patient_id: i64,
        record_id: i64,
    ) -> Result<Option<Map<String, Value>>, AppError> {
        let sql = format!(
            "SELECT * FROM \"{}\" WHERE patient_id = ? AND id = ? LIMIT 1",
            desc.table
        );
        self.with(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([patient_id, record_id])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_map(row)?)),
                None => Ok(None),
            }
        })
    }

    /// Distinct stored values of a column matching a substring, for
    /// autocomplete feeds.
    pub fn distinct_values(
        &self,
        desc: &EntityDescriptor,
        column: &str,
        query: &str,
        limit: i64,
    ) -> Result<Vec<String>, AppError> {
        ensure_column(desc, column)?;
        let sql = format!(
            "SELECT DISTINCT {col} FROM \"{}\" WHERE {col} LIKE ? AND {col} IS NOT NULL \
             ORDER BY {col} LIMIT ?",
            desc.table,
            col = column
        );
        let pattern = format!("%{}%", query);

        self.with(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query((pattern.as_str(), limit))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(row.get(0)?);
            }
            Ok(out)
        })
    }

    /// ICD-10 lookup by code or description substring.
    pub fn search_icd10(&self, query: &str, limit: i64) -> Result<Vec<(String, String)>, AppError> {
        let pattern = format!("%{}%", query);
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT code, description FROM icd10 \
                 WHERE code LIKE ?1 OR description LIKE ?1 ORDER BY code LIMIT ?2",
            )?;
            let mut rows = stmt.query((pattern.as_str(), limit))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push((row.get(0)?, row.get(1)?));
            }
            Ok(out)
        })
    }

    /// Patient lookup across identity columns, for the search bar.
    pub fn search_patients(
        &self,
        query: &str,
        limit: i64,
    ) -> Result<Vec<Map<String, Value>>, AppError> {
        let pattern = format!("%{}%", query);
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM patient \
                 WHERE hn LIKE ?1 OR name LIKE ?1 OR hiv_clinic_id LIKE ?1 \
                    OR gov_id LIKE ?1 OR nap LIKE ?1 \
                 ORDER BY hn LIMIT ?2",
            )?;
            let mut rows = stmt.query((pattern.as_str(), limit))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(row_to_map(row)?);
            }
            Ok(out)
        })
    }

    /// One page of appointments on a given day, each with its patient row.
    #[allow(clippy::type_complexity)]
    pub fn appointments_on(
        &self,
        date: &str,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<(Map<String, Value>, Map<String, Value>)>, i64), AppError> {
        let offset = (page - 1) * per_page;

        self.with(|conn| {
            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM appointment WHERE date = ?",
                [date],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(
                "SELECT * FROM appointment WHERE date = ? ORDER BY id LIMIT ? OFFSET ?",
            )?;
            let mut rows = stmt.query((date, per_page, offset))?;
            let mut appointments = Vec::new();
            while let Some(row) = rows.next()? {
                appointments.push(row_to_map(row)?);
            }
            drop(rows);

            let mut patient_stmt = conn.prepare("SELECT * FROM patient WHERE id = ? LIMIT 1")?;
            let mut items = Vec::new();
            for appointment in appointments {
                let patient_id = appointment
                    .get("patient_id")
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                let mut patient_rows = patient_stmt.query([patient_id])?;
                if let Some(row) = patient_rows.next()? {
                    items.push((row_to_map(row)?, appointment));
                }
            }
            Ok((items, total))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_core::schema;
    use serde_json::json;

    fn db() -> Db {
        Db::open_in_memory().unwrap()
    }

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    fn sample_patient(hn: &str) -> Map<String, Value> {
        obj(json!({
            "hn": hn,
            "name": "Test Patient",
            "sex": "male",
            "gender": "Male",
            "nationality": "Thai",
            "is_refer": "new",
            "bill_payer": "universal-coverage",
            "address": "Bangkok"
        }))
    }

    #[test]
    fn insert_and_fetch_round_trip() {
        let db = db();
        let id = db.insert(&schema::PATIENT, &sample_patient("1001")).unwrap();
        assert!(id > 0);

        let row = db
            .fetch_by(&schema::PATIENT, "hn", &json!("1001"))
            .unwrap()
            .unwrap();
        assert_eq!(row["name"], "Test Patient");
        assert!(row["timestamp"].is_string());
    }

    #[test]
    fn duplicate_hn_is_a_conflict() {
        let db = db();
        db.insert(&schema::PATIENT, &sample_patient("1001")).unwrap();

        let err = db
            .insert(&schema::PATIENT, &sample_patient("1001"))
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn replace_clears_omitted_fields_but_not_protected() {
        let db = db();
        let id = db.insert(&schema::PATIENT, &sample_patient("1001")).unwrap();

        let fields = obj(json!({
            "name": "Renamed",
            "sex": "male",
            "gender": "Male",
            "nationality": "Thai",
            "is_refer": "new",
            "bill_payer": "universal-coverage"
        }));
        db.replace(&schema::PATIENT, id, &fields).unwrap();

        let row = db
            .fetch_by(&schema::PATIENT, "id", &json!(id))
            .unwrap()
            .unwrap();
        assert_eq!(row["hn"], "1001");
        assert_eq!(row["name"], "Renamed");
        // address was omitted from the update and is not protected
        assert_eq!(row["address"], Value::Null);
    }

    #[test]
    fn replace_of_missing_row_is_not_found() {
        let db = db();
        let err = db
            .replace(&schema::PATIENT, 42, &obj(json!({"name": "x"})))
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn deleting_patient_cascades_to_children() {
        let db = db();
        let patient_id = db.insert(&schema::PATIENT, &sample_patient("1001")).unwrap();

        let visit = obj(json!({"date": "2024-01-15", "patient_id": patient_id}));
        let visit_id = db.insert(&schema::VISIT, &visit).unwrap();
        let lab = obj(json!({"date": "2024-01-15", "cd4": 350, "patient_id": patient_id}));
        let lab_id = db.insert(&schema::LAB, &lab).unwrap();

        db.delete_by(&schema::PATIENT, "id", &json!(patient_id))
            .unwrap();

        assert!(
            db.fetch_child(&schema::VISIT, patient_id, visit_id)
                .unwrap()
                .is_none()
        );
        assert!(
            db.fetch_child(&schema::LAB, patient_id, lab_id)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn exists_short_circuits_on_empty_input() {
        let db = db();
        db.insert(&schema::PATIENT, &sample_patient("1001")).unwrap();

        assert!(db.exists(&schema::PATIENT, "hn", "1001").unwrap());
        assert!(!db.exists(&schema::PATIENT, "hn", "").unwrap());
        assert!(!db.exists(&schema::PATIENT, "", "1001").unwrap());
    }

    #[test]
    fn exists_rejects_unknown_column() {
        let db = db();
        let err = db
            .exists(&schema::PATIENT, "hn; DROP TABLE patient", "x")
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn exists_excluding_ignores_own_row() {
        let db = db();
        let mut p1 = sample_patient("1001");
        p1.insert("nap".to_string(), json!("NAP-1"));
        db.insert(&schema::PATIENT, &p1).unwrap();

        // Re-submitting the same nap for the same hn is not a collision.
        assert!(
            !db.exists_excluding(
                &schema::PATIENT,
                "nap",
                &json!("NAP-1"),
                "hn",
                &json!("1001")
            )
            .unwrap()
        );
        // But it is for a different patient.
        assert!(
            db.exists_excluding(
                &schema::PATIENT,
                "nap",
                &json!("NAP-1"),
                "hn",
                &json!("2002")
            )
            .unwrap()
        );
    }

    #[test]
    fn child_pagination_reports_totals() {
        let db = db();
        let patient_id = db.insert(&schema::PATIENT, &sample_patient("1001")).unwrap();
        for day in 1..=5 {
            let visit = obj(json!({
                "date": format!("2024-01-{:02}", day),
                "patient_id": patient_id
            }));
            db.insert(&schema::VISIT, &visit).unwrap();
        }

        let (items, total) = db.list_children(&schema::VISIT, patient_id, 1, 2).unwrap();
        assert_eq!(total, 5);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["date"], "2024-01-01");

        let (items, _) = db.list_children(&schema::VISIT, patient_id, 3, 2).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["date"], "2024-01-05");
    }

    #[test]
    fn load_table_decodes_json_columns() {
        let db = db();
        let mut patient = sample_patient("1001");
        patient.insert("tel".to_string(), json!("[\"0812345678\"]"));
        db.insert(&schema::PATIENT, &patient).unwrap();

        let rows = db.load_table(&schema::PATIENT).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["tel"], json!(["0812345678"]));
    }

    #[test]
    fn load_table_propagates_corrupt_json() {
        let db = db();
        let mut patient = sample_patient("1001");
        patient.insert("tel".to_string(), json!("not json ["));
        db.insert(&schema::PATIENT, &patient).unwrap();

        assert!(db.load_table(&schema::PATIENT).is_err());
    }

    #[test]
    fn distinct_values_match_substring() {
        let db = db();
        let patient_id = db.insert(&schema::PATIENT, &sample_patient("1001")).unwrap();
        for film in ["CXR", "CT chest", "CXR"] {
            let imaging = obj(json!({
                "date": "2024-01-01",
                "film_type": film,
                "patient_id": patient_id
            }));
            db.insert(&schema::IMAGING, &imaging).unwrap();
        }

        let values = db
            .distinct_values(&schema::IMAGING, "film_type", "C", 10)
            .unwrap();
        assert_eq!(values, vec!["CT chest".to_string(), "CXR".to_string()]);
    }
}
