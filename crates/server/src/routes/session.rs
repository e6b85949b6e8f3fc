//! Login and logout.

use axum::{Extension, Json, extract::State};
use clinic_core::schema;
use serde_json::{Map, Value, json};

use crate::AppState;
use crate::auth::Claims;
use crate::error::AppError;
use crate::forms;

/// POST /api/login - Exchange credentials for a session token.
///
/// Unknown usernames and wrong passwords take the same artificial delay and
/// return the same 403, so response timing and shape leak nothing about
/// which part of the credential was wrong.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let data = forms::validate(forms::LOGIN_FORM, &body)?;
    let username = data["username"].as_str().unwrap_or_default().to_string();
    let password = data["password"].as_str().unwrap_or_default().to_string();

    let stored = state
        .db
        .fetch_by(&schema::USER, "username", &Value::String(username.clone()))?;

    let verified = match &stored {
        Some(row) => {
            let hash = row.get("password").and_then(Value::as_str).unwrap_or("");
            bcrypt::verify(&password, hash).unwrap_or(false)
        }
        None => false,
    };

    if !verified {
        tracing::warn!(username = %username, "Failed login attempt");
        tokio::time::sleep(state.config.login_delay).await;
        return Err(AppError::Forbidden(
            "Invalid username or password".to_string(),
        ));
    }

    let token = state.tokens.issue(&username)?;
    tracing::info!(username = %username, "Login");
    Ok(Json(json!({
        "message": format!("Logged in as {}", username),
        "access_token": token,
    })))
}

/// POST /api/logout - Revoke the presented token.
///
/// The auth middleware has already verified the token and stashed its
/// claims; revocation just records the `jti` so the same token fails the
/// middleware's denylist check from now on.
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>, AppError> {
    let mut row = Map::new();
    row.insert("jti".to_string(), Value::String(claims.jti.clone()));

    // A replayed logout hits the jti uniqueness constraint; the token is
    // already revoked, which is the state the caller asked for.
    match state.db.insert(&schema::REVOKED_TOKEN, &row) {
        Ok(_) | Err(AppError::Conflict(_)) => {}
        Err(err) => return Err(err),
    }

    tracing::info!(username = %claims.sub, "Logout");
    Ok(Json(json!({ "message": "Access token has been revoked" })))
}
