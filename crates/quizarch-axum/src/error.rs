//! HTTP error type and response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the HTTP layer.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Malformed or invalid request (validation, probe failure).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unknown job id.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Job queue at capacity.
    #[error("Too many requests: {0}")]
    TooManyRequests(String),
}

impl HttpError {
    /// Create a bad-request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a too-many-requests error.
    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::TooManyRequests(message.into())
    }
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::TooManyRequests(message) => (StatusCode::TOO_MANY_REQUESTS, message),
        };
        (status, axum::Json(ErrorBody { error: message })).into_response()
    }
}
