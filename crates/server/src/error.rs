// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::secrets::SecretError;

/// Structured JSON error response for API errors
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Secret not found: {0}")]
    SecretNotFound(String),

    #[error("Missing viewer identity")]
    Unauthenticated,

    #[error("Secret storage error: {0}")]
    Secrets(#[from] SecretError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::JobNotFound(id) => {
                tracing::warn!(job_id = %id, "Job not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Job not found", format!("Job ID: {}", id)),
                )
            }
            ApiError::SecretNotFound(key) => {
                tracing::warn!(key = %key, "Secret not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("Secret not found", format!("Key: {}", key)),
                )
            }
            ApiError::Unauthenticated => {
                tracing::warn!("Request without viewer identity");
                (
                    StatusCode::UNAUTHORIZED,
                    ErrorResponse::new("Missing viewer identity"),
                )
            }
            ApiError::Secrets(secret_err) => match secret_err {
                SecretError::BackendUnavailable(message) => {
                    tracing::error!(message = %message, "Secret backend unavailable");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        ErrorResponse::with_details("Secret backend unavailable", message.clone()),
                    )
                }
                SecretError::InvalidKey(key) => {
                    tracing::warn!(key = %key, "Invalid secret key");
                    (
                        StatusCode::BAD_REQUEST,
                        ErrorResponse::with_details("Invalid secret key", key.clone()),
                    )
                }
            },
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("Bad request", msg.clone()),
                )
            }
            ApiError::Unprocessable(msg) => {
                tracing::warn!(message = %msg, "Unprocessable request");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    ErrorResponse::with_details("Failed to save", msg.clone()),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
