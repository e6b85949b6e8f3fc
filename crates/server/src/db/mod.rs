//! SQLite store handle and schema.
//!
//! A single connection behind a mutex, handed to every handler through axum
//! state. Correctness for concurrent writers relies on SQLite's own
//! transactional isolation; the mutex only serializes in-process access to
//! the one connection.

mod store;

use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::Connection;

use crate::error::AppError;

/// Shared store handle, opened once at startup.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: &str) -> Result<Self, AppError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, AppError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection under the lock.
    pub(crate) fn with<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&conn)
    }

    /// Liveness probe for the health endpoint.
    pub fn ping(&self) -> Result<(), AppError> {
        self.with(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
    }
}

/// Idempotent schema: bookkeeping columns on every table, child tables
/// cascading from patient.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS patient (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp         TEXT NOT NULL,
    modify_timestamp  TEXT NOT NULL,
    hn                TEXT NOT NULL UNIQUE,
    hiv_clinic_id     TEXT UNIQUE,
    gov_id_type       TEXT,
    gov_id            TEXT UNIQUE,
    name              TEXT,
    dob               TEXT,
    first_encounter   TEXT,
    sex               TEXT,
    gender            TEXT,
    marital           TEXT,
    nationality       TEXT,
    education         TEXT,
    address           TEXT,
    tel               TEXT,
    relative_tel      TEXT,
    is_refer          TEXT,
    refer_from        TEXT,
    nap               TEXT UNIQUE,
    bill_payer        TEXT,
    plans             TEXT
);
CREATE INDEX IF NOT EXISTS idx_patient_hn ON patient(hn);

CREATE TABLE IF NOT EXISTS visit (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp             TEXT NOT NULL,
    modify_timestamp      TEXT NOT NULL,
    date                  TEXT NOT NULL,
    is_art_adherence      TEXT,
    art_adherence_scale   REAL,
    art_delay             REAL,
    art_adherence_problem TEXT,
    hx_contact_tb         TEXT,
    bw                    REAL,
    imp                   TEXT,
    arv                   TEXT,
    why_switched_arv      TEXT,
    oi_prophylaxis        TEXT,
    anti_tb               TEXT,
    vaccination           TEXT,
    patient_id            INTEGER NOT NULL REFERENCES patient(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_visit_patient ON visit(patient_id);

CREATE TABLE IF NOT EXISTS lab (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp        TEXT NOT NULL,
    modify_timestamp TEXT NOT NULL,
    date             TEXT NOT NULL,
    anti_hiv         TEXT,
    cd4              INTEGER,
    p_cd4            REAL,
    vl               TEXT,
    hiv_resistance   TEXT,
    hbsag            TEXT,
    anti_hbs         TEXT,
    anti_hcv         TEXT,
    afb              TEXT,
    sputum_gs        TEXT,
    sputum_cs        TEXT,
    genexpert        TEXT,
    vdrl             TEXT,
    rpr              TEXT,
    patient_id       INTEGER NOT NULL REFERENCES patient(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_lab_patient ON lab(patient_id);

CREATE TABLE IF NOT EXISTS imaging (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp        TEXT NOT NULL,
    modify_timestamp TEXT NOT NULL,
    date             TEXT NOT NULL,
    film_type        TEXT,
    result           TEXT,
    patient_id       INTEGER NOT NULL REFERENCES patient(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_imaging_patient ON imaging(patient_id);

CREATE TABLE IF NOT EXISTS appointment (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp        TEXT NOT NULL,
    modify_timestamp TEXT NOT NULL,
    date             TEXT NOT NULL,
    appointment_for  TEXT,
    patient_id       INTEGER NOT NULL REFERENCES patient(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_appointment_date ON appointment(date);

CREATE TABLE IF NOT EXISTS icd10 (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp        TEXT NOT NULL,
    modify_timestamp TEXT NOT NULL,
    code             TEXT NOT NULL UNIQUE,
    description      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp        TEXT NOT NULL,
    modify_timestamp TEXT NOT NULL,
    username         TEXT NOT NULL UNIQUE,
    password         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS revoked_token (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp        TEXT NOT NULL,
    modify_timestamp TEXT NOT NULL,
    jti              TEXT NOT NULL UNIQUE
);
"#;
