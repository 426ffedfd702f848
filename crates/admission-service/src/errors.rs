//! Admission service error types.
//!
//! All errors map to appropriate HTTP status codes via the `IntoResponse` impl.
//! Error messages returned to clients are intentionally generic to avoid
//! leaking internal details. Actual errors are logged server-side.

use crate::models::DenialReason;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Admission service error type.
///
/// Maps to appropriate HTTP status codes:
/// - Database, Internal: 500 Internal Server Error
/// - Denied(already_admitted | lost_race): 409 Conflict
/// - Denied(rate_limited): 429 Too Many Requests
/// - Denied(store_unavailable), ServiceUnavailable: 503 Service Unavailable
/// - AttachFailed: 502 Bad Gateway
/// - Unauthorized: 401 Unauthorized
/// - NotFound: 404 Not Found
/// - BadRequest: 400 Bad Request
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Admission denied: {0}")]
    Denied(DenialReason),

    #[error("Agent attach failed: {0}")]
    AttachFailed(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error")]
    Internal,
}

impl AdmissionError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            AdmissionError::Database(_) | AdmissionError::Internal => 500,
            AdmissionError::Denied(reason) => match reason {
                DenialReason::AlreadyAdmitted | DenialReason::LostRace => 409,
                DenialReason::RateLimited => 429,
                DenialReason::StoreUnavailable => 503,
            },
            AdmissionError::AttachFailed(_) => 502,
            AdmissionError::Unauthorized(_) => 401,
            AdmissionError::NotFound(_) => 404,
            AdmissionError::BadRequest(_) => 400,
            AdmissionError::ServiceUnavailable(_) => 503,
        }
    }

    /// Bounded error type label for metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            AdmissionError::Database(_) => "database",
            AdmissionError::Denied(reason) => reason.as_str(),
            AdmissionError::AttachFailed(_) => "attach_failed",
            AdmissionError::Unauthorized(_) => "unauthorized",
            AdmissionError::NotFound(_) => "not_found",
            AdmissionError::BadRequest(_) => "bad_request",
            AdmissionError::ServiceUnavailable(_) => "service_unavailable",
            AdmissionError::Internal => "internal",
        }
    }
}

impl From<DenialReason> for AdmissionError {
    fn from(reason: DenialReason) -> Self {
        AdmissionError::Denied(reason)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AdmissionError::Database(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "admission.database", error = %err, "Database operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            AdmissionError::Denied(reason) => match reason {
                DenialReason::AlreadyAdmitted => (
                    StatusCode::CONFLICT,
                    "ALREADY_ADMITTED",
                    "An agent is already connected or connecting to this meeting".to_string(),
                ),
                DenialReason::LostRace => (
                    StatusCode::CONFLICT,
                    "LOST_RACE",
                    "Another request is connecting an agent to this meeting".to_string(),
                ),
                DenialReason::RateLimited => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "RATE_LIMITED",
                    "Too many connection attempts. Please try again later.".to_string(),
                ),
                DenialReason::StoreUnavailable => {
                    tracing::warn!(target: "admission.availability", "Admission denied: lock store unavailable");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "STORE_UNAVAILABLE",
                        "Service temporarily unavailable".to_string(),
                    )
                }
            },
            AdmissionError::AttachFailed(reason) => {
                tracing::warn!(target: "admission.attach", reason = %reason, "Agent attach failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "ATTACH_FAILED",
                    "The agent could not be connected to the meeting".to_string(),
                )
            }
            AdmissionError::Unauthorized(reason) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", reason.clone())
            }
            AdmissionError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone())
            }
            AdmissionError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone())
            }
            AdmissionError::ServiceUnavailable(reason) => {
                // Log actual reason server-side
                tracing::warn!(target: "admission.availability", reason = %reason, "Service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable".to_string(),
                )
            }
            AdmissionError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        // Tell rate-limited callers when the throttle window is likely to reopen
        if status == StatusCode::TOO_MANY_REQUESTS {
            if let Ok(header_value) = "5".parse() {
                response.headers_mut().insert("Retry-After", header_value);
            }
        }

        response
    }
}

/// Convert sqlx errors to AdmissionError
impl From<sqlx::Error> for AdmissionError {
    fn from(err: sqlx::Error) -> Self {
        AdmissionError::Database(err.to_string())
    }
}
