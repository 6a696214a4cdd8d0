/// Unified error types for Channelhub
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum HubError {
    /// Malformed or missing caller-supplied data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Referenced account or channel does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness violation (handle or email already taken)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Bad credentials, expired/invalid/stale token, replayed refresh token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Store or signing subsystem failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Store round-trip exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HubError {
    /// True for failures the caller cannot fix by changing the request
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            HubError::Internal(_) | HubError::Database(_) | HubError::Io(_)
        )
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert HubError to HTTP response
impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            HubError::InvalidInput(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidInput",
                self.to_string(),
            ),
            HubError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            HubError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            HubError::Unauthorized(_) => (
                StatusCode::UNAUTHORIZED,
                "Unauthorized",
                self.to_string(),
            ),
            HubError::Timeout(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Unavailable",
                "Service temporarily unavailable".to_string(),
            ),
            HubError::Internal(_) | HubError::Database(_) | HubError::Io(_) => {
                tracing::error!("Internal failure: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalServerError",
                    "Internal server error".to_string(), // Don't leak details
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type HubResult<T> = Result<T, HubError>;
