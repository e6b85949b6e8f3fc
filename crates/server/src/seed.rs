//! One-time startup seeding.
//!
//! Runs to completion (or fails fast) before the listener starts accepting
//! requests: a bounded retry with backoff, not an unbounded poll racing real
//! traffic. Both steps are idempotent — they insert only when the target
//! table is empty — so a crashed-and-restarted process never double-inserts.

use std::time::Duration;

use clinic_core::schema;
use serde_json::{Map, Value};

use crate::config::Config;
use crate::db::Db;
use crate::error::AppError;

/// Bundled ICD-10 reference codes, one `CODE description` pair per line.
const ICD10_DATA: &str = include_str!("../data/icd10_codes.txt");

const MAX_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);

/// Seed the default credential and the ICD-10 lookup table.
pub async fn run(db: &Db, config: &Config) -> Result<(), AppError> {
    let mut backoff = INITIAL_BACKOFF;

    for attempt in 1..=MAX_ATTEMPTS {
        match seed_once(db, config) {
            Ok(()) => return Ok(()),
            Err(err) if attempt < MAX_ATTEMPTS => {
                tracing::warn!(
                    attempt,
                    error = ?err,
                    "Seeding failed, retrying in {:?}",
                    backoff
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
            Err(err) => return Err(err),
        }
    }

    unreachable!("seed loop returns within MAX_ATTEMPTS")
}

fn seed_once(db: &Db, config: &Config) -> Result<(), AppError> {
    seed_default_user(db, config)?;
    seed_icd10(db)?;
    Ok(())
}

fn seed_default_user(db: &Db, config: &Config) -> Result<(), AppError> {
    if db.count(&schema::USER)? > 0 {
        tracing::debug!("User table already populated, skipping default user");
        return Ok(());
    }

    let hashed = bcrypt::hash(&config.default_password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

    let mut user = Map::new();
    user.insert(
        "username".to_string(),
        Value::String(config.default_username.clone()),
    );
    user.insert("password".to_string(), Value::String(hashed));
    db.insert(&schema::USER, &user)?;

    tracing::info!(username = %config.default_username, "Seeded default user");
    Ok(())
}

fn seed_icd10(db: &Db) -> Result<(), AppError> {
    if db.count(&schema::ICD10)? > 0 {
        tracing::debug!("ICD-10 table already populated, skipping load");
        return Ok(());
    }

    tracing::info!("Loading ICD-10 reference codes");
    let mut inserted = 0;

    for line in ICD10_DATA.lines() {
        let Some((code, description)) = line.trim().split_once(char::is_whitespace) else {
            continue;
        };

        let mut row = Map::new();
        row.insert("code".to_string(), Value::String(code.to_string()));
        row.insert(
            "description".to_string(),
            Value::String(description.trim().to_string()),
        );
        db.insert(&schema::ICD10, &row)?;
        inserted += 1;
    }

    tracing::info!(count = inserted, "ICD-10 codes loaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            database_path: String::new(),
            bind_address: "0.0.0.0:0".to_string(),
            secret_key: "test".to_string(),
            token_ttl: Duration::from_secs(60),
            login_delay: Duration::from_millis(0),
            max_page_size: 20,
            max_search_results: 10,
            cors_origins: vec!["*".to_string()],
            default_username: "admin".to_string(),
            default_password: "admin".to_string(),
        }
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let db = Db::open_in_memory().unwrap();
        let config = test_config();

        run(&db, &config).await.unwrap();
        let users = db.count(&schema::USER).unwrap();
        let codes = db.count(&schema::ICD10).unwrap();
        assert_eq!(users, 1);
        assert!(codes > 0);

        // A second pass must not double-insert.
        run(&db, &config).await.unwrap();
        assert_eq!(db.count(&schema::USER).unwrap(), users);
        assert_eq!(db.count(&schema::ICD10).unwrap(), codes);
    }

    #[tokio::test]
    async fn seeded_password_verifies() {
        let db = Db::open_in_memory().unwrap();
        run(&db, &test_config()).await.unwrap();

        let row = db
            .fetch_by(&schema::USER, "username", &Value::String("admin".into()))
            .unwrap()
            .unwrap();
        let hash = row["password"].as_str().unwrap();
        assert!(bcrypt::verify("admin", hash).unwrap());
        assert!(!bcrypt::verify("wrong", hash).unwrap());
    }
}
