//! HTTP error responses.
//!
//! Every failure leaves the boundary as `{error, error_description}` with an
//! OAuth-style error code. Server-side failures are logged with the domain
//! error; the client only sees a generic description.

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};
use tunelink_domain::TuneLinkError;

/// Error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub error_description: String,
}

/// OAuth error code of a rendered error, left in the response extensions
/// for the metrics layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(pub &'static str);

/// An error ready to be rendered as an HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: &'static str,
    pub description: String,
    pub retry_after: Option<u64>,
}

impl ApiError {
    fn new(status: StatusCode, error: &'static str, description: impl Into<String>) -> Self {
        Self { status, error, description: description.into(), retry_after: None }
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", description)
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_grant", description)
    }

    pub fn server_error(description: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "server_error", description)
    }

    pub fn authorization_error(description: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "authorization_error", description)
    }

    pub fn access_denied(description: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "access_denied", description)
    }

    pub fn payload_too_large(description: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, "invalid_request", description)
    }

    pub fn rate_limited(description: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self {
            retry_after: Some(retry_after.unwrap_or(1).max(1)),
            ..Self::new(StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded", description)
        }
    }
}

/// Default mapping for errors no handler translated explicitly.
impl From<TuneLinkError> for ApiError {
    fn from(err: TuneLinkError) -> Self {
        match err {
            TuneLinkError::Validation(msg) => Self::invalid_request(msg),
            TuneLinkError::RateLimitExceeded { message, retry_after_secs } => {
                Self::rate_limited(message, retry_after_secs)
            }
            TuneLinkError::NotFound(msg) => Self::new(StatusCode::NOT_FOUND, "not_found", msg),
            other => {
                error!(error = %other, code = other.error_code(), "Request failed");
                Self::server_error("Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), error = self.error, "Request failed");
        } else {
            warn!(status = self.status.as_u16(), error = self.error, "Request rejected");
        }

        let body = ErrorBody { error: self.error.to_string(), error_description: self.description };
        let mut response = (self.status, Json(body)).into_response();
        response.extensions_mut().insert(ErrorCode(self.error));
        if let Some(secs) = self.retry_after {
            response.headers_mut().insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
