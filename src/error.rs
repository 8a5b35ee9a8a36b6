//! Error types for the cache proxy
//!
//! Two layers live here:
//! - [`ErrorKind`] / [`ErrorEnvelope`]: the closed, caller-visible taxonomy that every
//!   upstream failure is translated into. Envelopes never escape as Rust errors past the
//!   proxy handlers; they are returned as data.
//! - [`ProxyError`] / [`AppError`]: internal `Result` error types used with `?` inside the
//!   forwarding pipeline and the route layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Category of a failed proxy call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed caller input, never reaches the network
    InvalidRequest,
    /// Connect or read deadline exceeded
    TimeoutError,
    /// Upstream responded with a non-success status
    ApiError,
    /// Transport-level failure
    NetworkError,
    /// Failure after some stream bytes were already relayed
    StreamInterrupted,
    /// Uncategorized failure on the unary path
    InternalError,
    /// Uncategorized failure on the streaming path
    UnknownError,
}

impl ErrorKind {
    /// Wire name of this kind (the `type` field of an envelope)
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::TimeoutError => "timeout_error",
            ErrorKind::ApiError => "api_error",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::StreamInterrupted => "stream_interrupted",
            ErrorKind::InternalError => "internal_error",
            ErrorKind::UnknownError => "unknown_error",
        }
    }

    /// HTTP status the route layer answers with for this kind
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::InvalidRequest | ErrorKind::ApiError => StatusCode::BAD_REQUEST,
            ErrorKind::TimeoutError => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::NetworkError => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::StreamInterrupted
            | ErrorKind::InternalError
            | ErrorKind::UnknownError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured, caller-visible failure of a proxy call
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEnvelope {
    pub kind: ErrorKind,
    pub message: String,
    /// Upstream JSON error body, re-emitted verbatim in place of the generic body
    pub upstream_body: Option<Value>,
}

impl ErrorEnvelope {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            upstream_body: None,
        }
    }

    /// Attach the upstream's own JSON diagnostics
    pub fn with_upstream_body(mut self, body: Value) -> Self {
        self.upstream_body = Some(body);
        self
    }

    /// `{"error": {"type": ..., "message": ...}}`, or the upstream body when present
    pub fn to_json(&self) -> Value {
        match &self.upstream_body {
            Some(body) => body.clone(),
            None => self.generic_json(),
        }
    }

    /// The generic envelope, ignoring any upstream body
    pub fn generic_json(&self) -> Value {
        json!({
            "error": {
                "type": self.kind,
                "message": self.message,
            }
        })
    }
}

impl IntoResponse for ErrorEnvelope {
    fn into_response(self) -> Response {
        (self.kind.status_code(), Json(self.to_json())).into_response()
    }
}

/// Failure inside the forwarding pipeline, before classification into an envelope
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upstream request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("Upstream returned status {status}")]
    UpstreamStatus {
        status: reqwest::StatusCode,
        /// Parsed body when the upstream answered with JSON
        body: Option<Value>,
        /// Raw body text, for logs and stream error messages
        text: String,
    },

    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProxyError::Timeout(err)
        } else if err.is_decode() || err.is_builder() {
            ProxyError::Internal(err.to_string())
        } else {
            // connect, request, body and redirect failures are all transport-level
            ProxyError::Network(err)
        }
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::Internal(format!("JSON error: {}", err))
    }
}

impl ProxyError {
    /// Kind reported on the unary path
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ProxyError::Timeout(_) => ErrorKind::TimeoutError,
            ProxyError::UpstreamStatus { .. } => ErrorKind::ApiError,
            ProxyError::Network(_) => ErrorKind::NetworkError,
            ProxyError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Kind reported when the failure happens before any stream byte was relayed
    pub fn pre_stream_kind(&self) -> ErrorKind {
        match self.kind() {
            ErrorKind::InternalError => ErrorKind::UnknownError,
            kind => kind,
        }
    }

    /// Convert into the envelope returned by unary calls
    ///
    /// `upstream` names the provider in generic messages.
    pub fn into_envelope(self, upstream: &str) -> ErrorEnvelope {
        match self {
            ProxyError::InvalidRequest(msg) => ErrorEnvelope::new(ErrorKind::InvalidRequest, msg),
            ProxyError::Timeout(e) => ErrorEnvelope::new(
                ErrorKind::TimeoutError,
                format!("Request to {} API timed out: {}", upstream, e),
            ),
            ProxyError::UpstreamStatus { status, body, .. } => {
                let envelope = ErrorEnvelope::new(
                    ErrorKind::ApiError,
                    format!("{} API returned status {}", upstream, status.as_u16()),
                );
                match body {
                    Some(body) => envelope.with_upstream_body(body),
                    None => envelope,
                }
            }
            ProxyError::Network(e) => {
                ErrorEnvelope::new(ErrorKind::NetworkError, format!("Network error: {}", e))
            }
            ProxyError::Internal(msg) => ErrorEnvelope::new(
                ErrorKind::InternalError,
                format!("Internal server error: {}", msg),
            ),
        }
    }

    /// Convert into the envelope carried by a pre-stream SSE error frame
    ///
    /// Streams never pass the upstream body through; the frame always carries the
    /// generic envelope so the `data:` line stays well-formed.
    pub fn into_stream_envelope(self, upstream: &str) -> ErrorEnvelope {
        let kind = self.pre_stream_kind();
        let message = match &self {
            ProxyError::UpstreamStatus { status, text, .. } if !text.is_empty() => format!(
                "{} API returned status {}: {}",
                upstream,
                status.as_u16(),
                text
            ),
            ProxyError::UpstreamStatus { status, .. } => {
                format!("{} API returned status {}", upstream, status.as_u16())
            }
            ProxyError::Timeout(_) => format!("Request to {} API timed out", upstream),
            ProxyError::Internal(msg) => format!("Unexpected error: {}", msg),
            other => other.to_string(),
        };
        ErrorEnvelope::new(kind, message)
    }
}

/// Result type alias for the forwarding pipeline
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Route-layer errors raised before a request reaches a proxy handler
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Error response body for route-layer failures
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

/// Result type alias for route handlers
pub type AppResult<T> = Result<T, AppError>;
