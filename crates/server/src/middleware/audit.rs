//! Audit logging middleware for mutations

use axum::{body::Body, extract::Request, http::Method, middleware::Next, response::Response};
use clinic_core::schema;

use super::request_id::RequestId;

/// Record family a request path touches, for the audit trail.
///
/// Child paths carry their type tag in the fourth segment; everything the
/// router does not own falls through as "other".
fn entity_for(path: &str) -> &'static str {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match segments.as_slice() {
        ["api", "patient"] | ["api", "patient", _] => "patient",
        ["api", "patient", _, tag] | ["api", "patient", _, tag, _] => schema::child_descriptor(tag)
            .map(|desc| desc.entity)
            .unwrap_or("other"),
        ["api", "login"] | ["api", "logout"] => "session",
        _ => "other",
    }
}

/// Middleware to log mutations (POST, PUT, PATCH, DELETE) for audit purposes
pub async fn audit_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|r| r.0.clone())
        .unwrap_or_else(|| "unknown".to_string());

    // Run the request first to get the response status
    let response = next.run(request).await;

    if matches!(
        method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    ) {
        let status = response.status().as_u16();

        tracing::info!(
            target: "audit",
            request_id = %request_id,
            method = %method,
            path = %uri,
            entity = entity_for(&uri),
            status = %status,
            "Mutation request"
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_resolve_to_record_families() {
        assert_eq!(entity_for("/api/patient"), "patient");
        assert_eq!(entity_for("/api/patient/55^123"), "patient");
        assert_eq!(entity_for("/api/patient/1001/visits"), "visit");
        assert_eq!(entity_for("/api/patient/1001/labs/7"), "lab");
        assert_eq!(entity_for("/api/patient/1001/prescriptions"), "other");
        assert_eq!(entity_for("/api/login"), "session");
        assert_eq!(entity_for("/health"), "other");
    }
}
