use crate::storage::StorageError;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

/// API error taxonomy with HTTP status mapping.
///
/// Every error response carries a machine-readable `error` kind and a short
/// human-readable `message`; internal detail never leaks to clients.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed/missing fields or an unknown time-range token. Never
    /// reaches storage.
    Validation(String),
    /// Body exceeded the configured ingest size cap; rejected before the
    /// JSON parse completes.
    PayloadTooLarge,
    /// Fixed-window limit exceeded; carries a retry hint.
    RateLimited { retry_after_secs: u64 },
    /// Bad or missing bearer token on a protected endpoint.
    Unauthorized(String),
    /// The backing store cannot be reached.
    StorageUnavailable(String),
    /// The call exceeded its time bound. Distinct from `StorageUnavailable`:
    /// the store may still complete the operation after we give up.
    Timeout(String),
    Internal(String),
}

impl ApiError {
    /// Machine-readable error kind for the response body.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::PayloadTooLarge => "payload_too_large",
            Self::RateLimited { .. } => "rate_limit_exceeded",
            Self::Unauthorized(_) => "unauthorized",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal_error",
        }
    }

    const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(msg)
            | Self::Unauthorized(msg)
            | Self::StorageUnavailable(msg)
            | Self::Timeout(msg)
            | Self::Internal(msg) => write!(f, "{}: {msg}", self.kind()),
            Self::PayloadTooLarge => write!(f, "payload exceeds the configured size cap"),
            Self::RateLimited { retry_after_secs } => {
                write!(f, "rate limit exceeded, retry in {retry_after_secs}s")
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Validation(msg) | Self::Unauthorized(msg) | Self::Timeout(msg) => msg.clone(),
            Self::PayloadTooLarge => "payload exceeds the configured size cap".to_string(),
            Self::RateLimited { retry_after_secs } => {
                format!("rate limit exceeded, retry in {retry_after_secs} seconds")
            }
            Self::StorageUnavailable(msg) => {
                tracing::error!(error = %msg, "Storage unavailable");
                "storage unavailable".to_string()
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                "internal server error".to_string()
            }
        };

        let body = serde_json::json!({
            "success": false,
            "error": self.kind(),
            "message": message,
        });

        let mut response = (self.status(), Json(body)).into_response();
        if let Self::RateLimited { retry_after_secs } = self {
            if let Ok(value) = retry_after_secs.to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Unavailable(msg) => Self::StorageUnavailable(msg),
            StorageError::Database(e) => Self::Internal(e.to_string()),
        }
    }
}
