use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::config::Environment;

/// Application-wide error types with appropriate HTTP status codes.
///
/// Rendering is two-phase: `into_response` only records a [`HandlerFailure`]
/// on a bare status response, and the error boundary later turns it into the
/// [`ErrorEnvelope`] for the configured [`Environment`]. This keeps the
/// environment out of every call site that produces an error.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Handler panicked: {0}")]
    Panicked(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SerializationError(_)
            | AppError::Internal(_)
            | AppError::Panicked(_)
            | AppError::ConfigError(_)
            | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message that is safe to show any client.
    fn public_message(&self) -> String {
        match self {
            AppError::BadRequest(msg) | AppError::PayloadTooLarge(msg) | AppError::NotFound(msg) => {
                msg.clone()
            }
            _ => INTERNAL_SERVER_ERROR_MESSAGE.to_string(),
        }
    }
}

/// Generic message returned for server errors in production.
pub const INTERNAL_SERVER_ERROR_MESSAGE: &str = "Internal Server Error";

/// A failure waiting to be rendered by the error boundary.
///
/// Travels in response extensions from the point of failure to the
/// rendering stage.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    pub status: StatusCode,
    /// Client-safe message
    pub public_message: String,
    /// Full error message
    pub message: String,
    /// Debug rendering of the error and its source chain. This is what
    /// development responses expose as `stack`; panics carry their message
    /// here, since the unwound frames are gone by the time they are caught.
    pub detail: String,
}

impl From<&AppError> for HandlerFailure {
    fn from(error: &AppError) -> Self {
        Self {
            status: error.status(),
            public_message: error.public_message(),
            message: error.to_string(),
            detail: format!("{error:?}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let failure = HandlerFailure::from(&self);
        let mut response = failure.status.into_response();
        response.extensions_mut().insert(failure);
        response
    }
}

/// Uniform error body.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub message: String,
    /// [`HandlerFailure::detail`], outside production only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorEnvelope {
    /// Shape a failure for the given environment.
    ///
    /// Production never exposes internal text or stacks; development shows
    /// both.
    pub fn for_failure(failure: &HandlerFailure, environment: Environment) -> Self {
        if environment.is_production() {
            let message = if failure.status.is_server_error() {
                INTERNAL_SERVER_ERROR_MESSAGE.to_string()
            } else {
                failure.public_message.clone()
            };
            Self {
                success: false,
                message,
                stack: None,
            }
        } else {
            Self {
                success: false,
                message: failure.message.clone(),
                stack: Some(failure.detail.clone()),
            }
        }
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
