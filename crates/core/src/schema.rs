//! Entity registry for the clinic data model.
//!
//! One descriptor per record kind; the server's generic SQL layer and the
//! resource handlers are driven entirely by these tables.

use crate::descriptor::EntityDescriptor;
use crate::error::CoreError;

pub const PATIENT: EntityDescriptor = EntityDescriptor {
    entity: "patient",
    table: "patient",
    columns: &[
        "hn",
        "hiv_clinic_id",
        "gov_id_type",
        "gov_id",
        "name",
        "dob",
        "first_encounter",
        "sex",
        "gender",
        "marital",
        "nationality",
        "education",
        "address",
        "tel",
        "relative_tel",
        "is_refer",
        "refer_from",
        "nap",
        "bill_payer",
        "plans",
    ],
    protected: &["id", "hn", "timestamp", "modify_timestamp"],
    json_encoded: &["tel", "relative_tel", "plans"],
    hidden: &[],
    unique: &["hn", "hiv_clinic_id", "gov_id", "nap"],
};

pub const VISIT: EntityDescriptor = EntityDescriptor {
    entity: "visit",
    table: "visit",
    columns: &[
        "date",
        "is_art_adherence",
        "art_adherence_scale",
        "art_delay",
        "art_adherence_problem",
        "hx_contact_tb",
        "bw",
        "imp",
        "arv",
        "why_switched_arv",
        "oi_prophylaxis",
        "anti_tb",
        "vaccination",
        "patient_id",
    ],
    protected: &["id", "date", "patient_id", "timestamp", "modify_timestamp"],
    json_encoded: &["imp", "arv", "oi_prophylaxis", "anti_tb", "vaccination"],
    hidden: &[],
    unique: &[],
};

pub const LAB: EntityDescriptor = EntityDescriptor {
    entity: "lab",
    table: "lab",
    columns: &[
        "date",
        "anti_hiv",
        "cd4",
        "p_cd4",
        "vl",
        "hiv_resistance",
        "hbsag",
        "anti_hbs",
        "anti_hcv",
        "afb",
        "sputum_gs",
        "sputum_cs",
        "genexpert",
        "vdrl",
        "rpr",
        "patient_id",
    ],
    protected: &["id", "date", "patient_id", "timestamp", "modify_timestamp"],
    json_encoded: &[],
    hidden: &[],
    unique: &[],
};

pub const IMAGING: EntityDescriptor = EntityDescriptor {
    entity: "imaging",
    table: "imaging",
    columns: &["date", "film_type", "result", "patient_id"],
    protected: &["id", "date", "patient_id", "timestamp", "modify_timestamp"],
    json_encoded: &[],
    hidden: &[],
    unique: &[],
};

pub const APPOINTMENT: EntityDescriptor = EntityDescriptor {
    entity: "appointment",
    table: "appointment",
    columns: &["date", "appointment_for", "patient_id"],
    protected: &["id", "date", "patient_id", "timestamp", "modify_timestamp"],
    json_encoded: &[],
    hidden: &[],
    unique: &[],
};

/// Static reference table, loaded once at startup and never mutated.
pub const ICD10: EntityDescriptor = EntityDescriptor {
    entity: "icd10",
    table: "icd10",
    columns: &["code", "description"],
    protected: &["id", "code", "timestamp", "modify_timestamp"],
    json_encoded: &[],
    hidden: &[],
    unique: &["code"],
};

pub const USER: EntityDescriptor = EntityDescriptor {
    entity: "user",
    table: "user",
    columns: &["username", "password"],
    protected: &["id", "username", "timestamp", "modify_timestamp"],
    json_encoded: &[],
    hidden: &["password"],
    unique: &["username"],
};

/// Denylist of session-token identifiers invalidated before natural expiry.
pub const REVOKED_TOKEN: EntityDescriptor = EntityDescriptor {
    entity: "revoked_token",
    table: "revoked_token",
    columns: &["jti"],
    protected: &["id", "jti", "timestamp", "modify_timestamp"],
    json_encoded: &[],
    hidden: &[],
    unique: &["jti"],
};

/// URL type tags for the per-patient child families.
pub const CHILD_TAGS: &[&str] = &["visits", "labs", "imaging", "appointments"];

/// Resolve a child family type tag to its descriptor.
pub fn child_descriptor(tag: &str) -> Option<&'static EntityDescriptor> {
    match tag {
        "visits" => Some(&VISIT),
        "labs" => Some(&LAB),
        "imaging" => Some(&IMAGING),
        "appointments" => Some(&APPOINTMENT),
        _ => None,
    }
}

/// Every registered descriptor, for startup validation and schema creation.
pub const ALL: &[&EntityDescriptor] = &[
    &PATIENT,
    &VISIT,
    &LAB,
    &IMAGING,
    &APPOINTMENT,
    &ICD10,
    &USER,
    &REVOKED_TOKEN,
];

/// Consistency-check every descriptor; run once at startup.
pub fn validate_all() -> Result<(), CoreError> {
    for desc in ALL {
        desc.validate()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_descriptors_are_consistent() {
        validate_all().unwrap();
    }

    #[test]
    fn child_tags_resolve() {
        for tag in CHILD_TAGS {
            assert!(child_descriptor(tag).is_some());
        }
        assert!(child_descriptor("prescriptions").is_none());
    }

    #[test]
    fn patient_unique_columns_are_identity_fields() {
        assert_eq!(PATIENT.unique, &["hn", "hiv_clinic_id", "gov_id", "nap"]);
    }
}
