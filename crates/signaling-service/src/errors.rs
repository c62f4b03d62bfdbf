//! Signaling service error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl and are
//! rendered as `{error, details}`. Internal failures are logged server-side
//! and reduced to a generic message.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::ErrorResponse;
use thiserror::Error;

/// Signaling gateway error type.
///
/// Maps to HTTP status codes:
/// - `MissingFields`, `InvalidParameter`: 400 Bad Request
/// - `RoomNotFound`: 404 Not Found
/// - `Gone`: 410 Gone
/// - `Internal`: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum SignalingError {
    /// One or more required request fields were absent or blank.
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// A parameter was present but unusable (bad cursor, malformed body).
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Endpoint retired in favour of another.
    #[error("Gone: {0}")]
    Gone(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SignalingError {
    /// Returns the HTTP status code for this error (for metrics recording).
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            SignalingError::MissingFields(_) | SignalingError::InvalidParameter(_) => 400,
            SignalingError::RoomNotFound(_) => 404,
            SignalingError::Gone(_) => 410,
            SignalingError::Internal(_) => 500,
        }
    }

    /// Reject a request if `missing` is non-empty.
    pub fn check_fields(missing: Vec<&'static str>) -> Result<(), SignalingError> {
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SignalingError::MissingFields(missing))
        }
    }
}

impl IntoResponse for SignalingError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            SignalingError::MissingFields(fields) => (
                StatusCode::BAD_REQUEST,
                "Missing required fields",
                fields.join(", "),
            ),
            SignalingError::RoomNotFound(room_id) => (
                StatusCode::NOT_FOUND,
                "Room not found",
                format!("Room {room_id} does not exist"),
            ),
            SignalingError::InvalidParameter(reason) => {
                (StatusCode::BAD_REQUEST, "Invalid parameter", reason.clone())
            }
            SignalingError::Gone(reason) => (StatusCode::GONE, "Gone", reason.clone()),
            SignalingError::Internal(reason) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "signaling.gateway", error = %reason, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for SignalingError {
    fn from(rejection: JsonRejection) -> Self {
        SignalingError::InvalidParameter(rejection.body_text())
    }
}

impl From<QueryRejection> for SignalingError {
    fn from(rejection: QueryRejection) -> Self {
        SignalingError::InvalidParameter(rejection.body_text())
    }
}
