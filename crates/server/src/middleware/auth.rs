//! Bearer-token authentication middleware.

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use clinic_core::schema;

use crate::AppState;
use crate::error::AppError;

/// Require a valid, non-revoked, non-expired session token on the request.
///
/// On success the decoded claims are inserted into the request extensions so
/// handlers (logout in particular) can read the token identity.
pub async fn require_token(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Missing authorization token".to_string()))?;

    let claims = state.tokens.verify(token)?;

    // A revoked jti fails validation even before the token's natural expiry.
    if state
        .db
        .exists(&schema::REVOKED_TOKEN, "jti", &claims.jti)?
    {
        tracing::debug!(user = %claims.sub, "Rejected revoked token");
        return Err(AppError::Unauthorized(
            "The token has been revoked".to_string(),
        ));
    }

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
