//! Request-body validation.
//!
//! Each entity family has a field schema: name, type, whether it is
//! required, and an optional closed set of allowed values. Validation
//! failures surface as 422; validated bodies keep only declared keys.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Date,
    TextList,
    /// List of `{date, plan}` entries.
    PlanList,
}

pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Closed set of allowed values for text fields; empty means open.
    pub one_of: &'static [&'static str],
    /// Extra format check for text fields.
    pub check: Option<fn(&str) -> bool>,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
        one_of: &[],
        check: None,
    }
}

const fn required(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: true,
        one_of: &[],
        check: None,
    }
}

const fn one_of(name: &'static str, values: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Text,
        required: false,
        one_of: values,
        check: None,
    }
}

const fn required_one_of(name: &'static str, values: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Text,
        required: true,
        one_of: values,
        check: None,
    }
}

const POS_NEG: &[&str] = &["+", "-", "+/-"];

/// RPR titer format: `1:<digits>`.
fn is_titer(value: &str) -> bool {
    value
        .strip_prefix("1:")
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

pub const PATIENT_FORM: &[FieldSpec] = &[
    one_of("gov_id_type", &["national-id", "passport"]),
    field("gov_id", FieldKind::Text),
    required("name", FieldKind::Text),
    field("dob", FieldKind::Date),
    field("first_encounter", FieldKind::Date),
    required_one_of("sex", &["male", "female"]),
    required_one_of(
        "gender",
        &["Male", "Female", "MSM", "Bisexual", "Lesbian", "TG"],
    ),
    one_of("marital", &["single", "married", "divorced", "widowed"]),
    required("nationality", FieldKind::Text),
    one_of(
        "education",
        &[
            "below-secondary",
            "secondary",
            "vocational",
            "bachelor",
            "master",
            "doctorate",
        ],
    ),
    field("address", FieldKind::Text),
    field("tel", FieldKind::TextList),
    field("relative_tel", FieldKind::TextList),
    required_one_of(
        "is_refer",
        &["new", "transfer-not-on-art", "transfer-on-art"],
    ),
    field("refer_from", FieldKind::Text),
    required("hn", FieldKind::Text),
    field("hiv_clinic_id", FieldKind::Text),
    field("nap", FieldKind::Text),
    required_one_of(
        "bill_payer",
        &[
            "universal-coverage",
            "universal-coverage-external",
            "social-security",
            "social-security-external",
            "civil-servant",
            "migrant",
            "self-pay",
        ],
    ),
    field("plans", FieldKind::PlanList),
];

pub const VISIT_FORM: &[FieldSpec] = &[
    required("date", FieldKind::Date),
    one_of("is_art_adherence", &["Yes", "No"]),
    field("art_delay", FieldKind::Float),
    field("art_adherence_scale", FieldKind::Float),
    field("art_adherence_problem", FieldKind::Text),
    field("hx_contact_tb", FieldKind::Text),
    field("bw", FieldKind::Float),
    required("imp", FieldKind::TextList),
    field("arv", FieldKind::TextList),
    field("why_switched_arv", FieldKind::Text),
    field("oi_prophylaxis", FieldKind::TextList),
    field("anti_tb", FieldKind::TextList),
    field("vaccination", FieldKind::TextList),
];

pub const LAB_FORM: &[FieldSpec] = &[
    required("date", FieldKind::Date),
    one_of("anti_hiv", POS_NEG),
    field("cd4", FieldKind::Integer),
    field("p_cd4", FieldKind::Float),
    field("vl", FieldKind::Text),
    field("hiv_resistance", FieldKind::Text),
    one_of("hbsag", POS_NEG),
    one_of("anti_hbs", POS_NEG),
    one_of("anti_hcv", POS_NEG),
    one_of("afb", &["3+", "2+", "1+", "scanty", "-"]),
    field("sputum_gs", FieldKind::Text),
    field("sputum_cs", FieldKind::Text),
    field("genexpert", FieldKind::Text),
    one_of("vdrl", POS_NEG),
    FieldSpec {
        name: "rpr",
        kind: FieldKind::Text,
        required: false,
        one_of: &[],
        check: Some(is_titer),
    },
];

pub const IMAGING_FORM: &[FieldSpec] = &[
    required("date", FieldKind::Date),
    required("film_type", FieldKind::Text),
    required("result", FieldKind::Text),
];

pub const APPOINTMENT_FORM: &[FieldSpec] = &[
    required("date", FieldKind::Date),
    required("appointment_for", FieldKind::Text),
];

pub const LOGIN_FORM: &[FieldSpec] = &[
    required("username", FieldKind::Text),
    required("password", FieldKind::Text),
];

/// Validate a JSON body against a field schema.
///
/// Returns a map holding only the declared fields that were present;
/// undeclared keys are dropped, missing optional fields stay absent.
pub fn validate(form: &[FieldSpec], body: &Value) -> Result<Map<String, Value>, AppError> {
    let Some(object) = body.as_object() else {
        return Err(AppError::Unprocessable(
            "Request body must be a JSON object".to_string(),
        ));
    };

    let mut out = Map::new();

    for spec in form {
        let value = object.get(spec.name);

        let Some(value) = value.filter(|v| !v.is_null()) else {
            if spec.required {
                return Err(AppError::Unprocessable(format!(
                    "Missing required field `{}`",
                    spec.name
                )));
            }
            continue;
        };

        check_value(spec, value)?;
        out.insert(spec.name.to_string(), value.clone());
    }

    Ok(out)
}

fn check_value(spec: &FieldSpec, value: &Value) -> Result<(), AppError> {
    let fail = |why: &str| {
        Err(AppError::Unprocessable(format!(
            "Field `{}` {}",
            spec.name, why
        )))
    };

    match spec.kind {
        FieldKind::Text => {
            let Some(text) = value.as_str() else {
                return fail("must be a string");
            };
            if !spec.one_of.is_empty() && !spec.one_of.contains(&text) {
                return fail("is not an allowed value");
            }
            if let Some(check) = spec.check {
                if !check(text) {
                    return fail("has an invalid format");
                }
            }
            Ok(())
        }
        FieldKind::Integer => {
            if value.as_i64().is_none() {
                return fail("must be an integer");
            }
            Ok(())
        }
        FieldKind::Float => {
            if value.as_f64().is_none() {
                return fail("must be a number");
            }
            Ok(())
        }
        FieldKind::Date => {
            let Some(text) = value.as_str() else {
                return fail("must be an ISO-8601 date string");
            };
            if NaiveDate::parse_from_str(text, "%Y-%m-%d").is_err() {
                return fail("must be an ISO-8601 date (YYYY-MM-DD)");
            }
            Ok(())
        }
        FieldKind::TextList => {
            let Some(items) = value.as_array() else {
                return fail("must be a list of strings");
            };
            if spec.required && items.is_empty() {
                return fail("must not be empty");
            }
            if !items.iter().all(Value::is_string) {
                return fail("must contain only strings");
            }
            Ok(())
        }
        FieldKind::PlanList => {
            let Some(items) = value.as_array() else {
                return fail("must be a list of {date, plan} entries");
            };
            for item in items {
                let valid = item.as_object().is_some_and(|entry| {
                    let date_ok = entry
                        .get("date")
                        .and_then(Value::as_str)
                        .is_some_and(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").is_ok());
                    let plan_ok = entry.get("plan").is_some_and(Value::is_string);
                    date_ok && plan_ok && entry.len() == 2
                });
                if !valid {
                    return fail("entries must be {date, plan} with an ISO date");
                }
            }
            Ok(())
        }
    }
}
