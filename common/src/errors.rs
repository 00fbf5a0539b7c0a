use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

/// Structured error types surfaced to HTTP callers
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Too many requests. Please try again later.")]
    RateLimited { retry_after: Duration },

    #[error("{message}")]
    ServiceUnavailable {
        message: String,
        retry_after: Duration,
    },

    #[error("{0}")]
    BadGateway(String),

    #[error("Upstream error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Failure of a single upstream attempt, before it is mapped to an `AppError`
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("upstream responded with HTTP {status}")]
    Status { status: u16, body: String },

    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream connection failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("upstream returned a malformed body: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid upstream url: {0}")]
    InvalidUrl(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<serde_json::Value>,
}

impl AppError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::HttpError {
            status,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::BadGateway(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>, retry_after: Duration) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
            retry_after,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::HttpError { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// How long the caller should wait before trying again, when known.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AppError::RateLimited { retry_after }
            | AppError::ServiceUnavailable { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    fn meta(&self) -> Option<serde_json::Value> {
        match self {
            AppError::ServiceUnavailable { retry_after, .. } => Some(serde_json::json!({
                "circuit_open_for_ms": retry_after.as_millis() as u64
            })),
            AppError::HttpError { status, .. } => Some(serde_json::json!({ "status": status })),
            _ => None,
        }
    }
}

impl UpstreamError {
    /// Timeouts, transport failures, 5xx and 429 are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Status { status, .. } => *status >= 500 || *status == 429,
            UpstreamError::Timeout | UpstreamError::Network(_) => true,
            UpstreamError::Malformed(_) | UpstreamError::InvalidUrl(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            UpstreamError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Short machine-readable reason used in log events.
    pub fn reason(&self) -> &'static str {
        match self {
            UpstreamError::Status { .. } => "http_status",
            UpstreamError::Timeout => "timeout",
            UpstreamError::Network(e) if e.is_connect() => "connect",
            UpstreamError::Network(_) => "network",
            UpstreamError::Malformed(_) => "malformed_body",
            UpstreamError::InvalidUrl(_) => "invalid_url",
        }
    }
}

impl From<UpstreamError> for AppError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Status { status: 404, .. } => {
                AppError::not_found("City not found at upstream provider.")
            }
            UpstreamError::Status { status, .. } => AppError::http(
                status,
                format!("weather provider responded with HTTP {status}"),
            ),
            UpstreamError::Timeout => {
                AppError::bad_gateway("Upstream weather provider timed out")
            }
            UpstreamError::Network(e) => {
                AppError::bad_gateway(format!("Upstream weather provider unreachable: {e}"))
            }
            UpstreamError::Malformed(_) => {
                AppError::bad_gateway("Upstream weather provider returned a malformed response")
            }
            UpstreamError::InvalidUrl(message) => AppError::internal(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed with server error");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request failed with client error");
        }

        let retry_after = self.retry_after();
        let body = Json(ErrorResponse {
            error: self.to_string(),
            meta: self.meta(),
        });

        let mut response = (status, body).into_response();
        if let Some(wait) = retry_after {
            // Round up so clients never retry before the window closes
            let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
