//! API error types and responses.
//!
//! Every error leaves the relay as `{"error": {"code", "message"}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parley_core::IdError;
use serde::Serialize;
use thiserror::Error;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request body or parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The assistant backend could not be reached.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The assistant backend did not answer in time.
    #[error("upstream timed out")]
    UpstreamTimeout,

    /// The assistant backend answered with a failure status.
    #[error("upstream returned status {0}")]
    UpstreamStatus(u16),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Error details.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamUnavailable(_) | Self::UpstreamStatus(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::UpstreamStatus(_) => "upstream_status",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

impl From<IdError> for ApiError {
    fn from(err: IdError) -> Self {
        Self::BadRequest(format!("conversation id: {err}"))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::UpstreamTimeout
        } else {
            tracing::warn!(error = %err, "Upstream request failed");
            Self::UpstreamUnavailable(if err.is_connect() {
                "connection refused".to_string()
            } else {
                "request failed".to_string()
            })
        }
    }
}
