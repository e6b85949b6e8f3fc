//! Clinic statistics.
//!
//! Bulk-loads the patient, visit and lab tables in serialized form and
//! reduces them to the dashboard's summary tables. Read-only; an empty
//! store produces an empty document, never an error.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use clinic_core::schema;
use clinic_core::stats::{self, MISSING, Table};
use serde_json::{Map, Value};

use crate::db::Db;
use crate::error::AppError;

/// Build the full statistics document.
pub fn build(db: &Db) -> Result<Map<String, Value>, AppError> {
    let today = Utc::now().date_naive();
    let mut out = Map::new();

    patient_sections(db, today, &mut out)?;
    visit_sections(db, &mut out)?;
    lab_sections(db, &mut out)?;

    Ok(out)
}

fn push(out: &mut Map<String, Value>, key: &str, table: Table) {
    if !table.is_empty() {
        out.insert(key.to_string(), serde_json::json!(table));
    }
}

fn get_str(row: &Map<String, Value>, key: &str) -> Option<String> {
    row.get(key).and_then(Value::as_str).map(|s| s.to_string())
}

fn get_date(row: &Map<String, Value>, key: &str) -> Option<NaiveDate> {
    row.get(key)
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn get_list(row: &Map<String, Value>, key: &str) -> Vec<String> {
    row.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn patient_sections(
    db: &Db,
    today: NaiveDate,
    out: &mut Map<String, Value>,
) -> Result<(), AppError> {
    let patients = db.load_table(&schema::PATIENT)?;
    if patients.is_empty() {
        return Ok(());
    }

    // Age pyramid, derived from date of birth.
    let ages_months: Vec<i64> = patients
        .iter()
        .filter_map(|p| get_date(p, "dob"))
        .map(|dob| stats::months_between(dob, today))
        .collect();

    let infant_months: Vec<i64> = ages_months.iter().copied().filter(|&m| m < 12).collect();
    push(
        out,
        "count_age_less_than_one",
        stats::histogram(&infant_months, 1, "Age-Months"),
    );

    let ages_years: Vec<i64> = ages_months.iter().map(|m| m / 12).collect();
    push(out, "count_age", stats::histogram(&ages_years, 10, "Age-Years"));

    // Monthly intake cross-tabulated by category.
    let monthly = [
        ("monthly_sex", "sex"),
        ("monthly_nationality", "nationality"),
        ("monthly_is_refer", "is_refer"),
        ("monthly_refer_from", "refer_from"),
        ("monthly_bill_payer", "bill_payer"),
    ];
    for (section, column) in monthly {
        let pairs: Vec<(String, String)> = patients
            .iter()
            .filter_map(|p| {
                let month = get_date(p, "first_encounter").map(stats::month_key)?;
                let value = get_str(p, column)?;
                Some((month, value))
            })
            .collect();
        push(out, section, stats::crosstab(&pairs, "First Encounter"));
    }

    // Overall demographic counts.
    push(
        out,
        "count_first_encounter",
        stats::group_count(
            patients
                .iter()
                .map(|p| get_date(p, "first_encounter").map(stats::month_key)),
            "First Encounter",
            Some(MISSING),
        ),
    );

    let grouped = [
        ("count_education", "education", "Education Level"),
        ("count_nationality", "nationality", "Nationality"),
        ("count_sex", "sex", "Sex"),
        ("count_gender", "gender", "Gender"),
        ("count_marital", "marital", "Marital Status"),
        ("count_is_refer", "is_refer", "Referral Status"),
        ("count_refer_from", "refer_from", "Referred From"),
        ("count_bill_payer", "bill_payer", "Bill Payer"),
    ];
    for (section, column, label) in grouped {
        push(
            out,
            section,
            stats::group_count(
                patients.iter().map(|p| get_str(p, column)),
                label,
                Some(MISSING),
            ),
        );
    }

    Ok(())
}

fn visit_sections(db: &Db, out: &mut Map<String, Value>) -> Result<(), AppError> {
    let mut visits = db.load_table(&schema::VISIT)?;
    if visits.is_empty() {
        return Ok(());
    }

    push(
        out,
        "count_monthly_visit",
        stats::group_count(
            visits
                .iter()
                .map(|v| get_date(v, "date").map(stats::month_key)),
            "Month/Year",
            None,
        ),
    );

    // Latest visit per patient drives the current-regimen sections.
    visits.sort_by(|a, b| {
        let key = |v: &Map<String, Value>| {
            (
                get_date(v, "date"),
                v.get("id").and_then(Value::as_i64),
            )
        };
        key(a).cmp(&key(b))
    });
    let mut latest: BTreeMap<i64, &Map<String, Value>> = BTreeMap::new();
    for visit in &visits {
        if let Some(patient_id) = visit.get("patient_id").and_then(Value::as_i64) {
            latest.insert(patient_id, visit);
        }
    }

    push(
        out,
        "count_arv_regimen",
        stats::group_count(
            latest.values().map(|v| {
                let arv = get_list(v, "arv");
                if arv.is_empty() {
                    None
                } else {
                    Some(arv.join(", "))
                }
            }),
            "ARV Regimens",
            None,
        ),
    );

    let latest_lists = |column: &str| -> Vec<Vec<String>> {
        latest.values().map(|v| get_list(v, column)).collect()
    };
    let all_lists = |column: &str| -> Vec<Vec<String>> {
        visits.iter().map(|v| get_list(v, column)).collect()
    };

    let arv = latest_lists("arv");
    push(
        out,
        "count_arv_breakdown",
        stats::counts_to_table(&stats::count_in_lists(arv.iter()), "ARV Breakdown"),
    );

    push(
        out,
        "count_why_switched_arv",
        stats::group_count(
            visits.iter().map(|v| get_str(v, "why_switched_arv")),
            "Why Change ARV Regimens",
            Some(MISSING),
        ),
    );

    let oi = latest_lists("oi_prophylaxis");
    push(
        out,
        "count_oi_prophylaxis",
        stats::counts_to_table(&stats::count_in_lists(oi.iter()), "OI Prophylaxis"),
    );

    let anti_tb = latest_lists("anti_tb");
    push(
        out,
        "count_anti_tb",
        stats::counts_to_table(&stats::count_in_lists(anti_tb.iter()), "Anti-TB Medications"),
    );

    let vaccination = all_lists("vaccination");
    push(
        out,
        "count_vaccination",
        stats::counts_to_table(&stats::count_in_lists(vaccination.iter()), "Vaccines"),
    );

    let imp = all_lists("imp");
    push(
        out,
        "count_imp",
        stats::counts_to_table(&stats::count_in_lists(imp.iter()), "Impressions"),
    );

    Ok(())
}

fn lab_sections(db: &Db, out: &mut Map<String, Value>) -> Result<(), AppError> {
    let labs = db.load_table(&schema::LAB)?;
    if labs.is_empty() {
        return Ok(());
    }

    push(
        out,
        "count_monthly_lab",
        stats::group_count(
            labs.iter().map(|l| get_date(l, "date").map(stats::month_key)),
            "Month/Year",
            None,
        ),
    );

    push(
        out,
        "count_anti_hiv",
        stats::group_count(
            labs.iter().map(|l| get_str(l, "anti_hiv")),
            "Anti-HIV",
            Some(MISSING),
        ),
    );

    Ok(())
}
