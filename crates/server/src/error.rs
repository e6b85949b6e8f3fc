//! Application error handling

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Application error type
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Unprocessable(String),
    Internal(String),
}

/// JSON error payload returned to clients
#[derive(Serialize)]
struct ErrorBody {
    #[serde(rename = "statusCode")]
    status_code: u16,
    name: String,
    description: String,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn description(&self) -> &str {
        match self {
            AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Unprocessable(msg) => msg,
            // Internal detail is logged, never leaked to the client.
            AppError::Internal(_) => "An unexpected error has occurred",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let AppError::Internal(detail) = &self {
            tracing::error!(error = %detail, "Internal server error");
        }

        let body = ErrorBody {
            status_code: status.as_u16(),
            name: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            description: self.description().to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            // A lost uniqueness race surfaces as a constraint violation; the
            // caller sees a conflict, not a server error.
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                AppError::Conflict("Uniqueness constraint violated".to_string())
            }
            _ => AppError::Internal(format!("Database error: {}", err)),
        }
    }
}

impl From<clinic_core::CoreError> for AppError {
    fn from(err: clinic_core::CoreError) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_violation_maps_to_conflict() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("UNIQUE constraint failed: patient.hn".to_string()),
        );
        assert!(matches!(AppError::from(err), AppError::Conflict(_)));
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let err = AppError::Internal("secret table missing".to_string());
        assert_eq!(err.description(), "An unexpected error has occurred");
    }
}
