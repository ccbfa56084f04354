use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::Value;

use crate::protocol::error_shapes::{openai_error_payload, upstream_error_message};
use crate::transport::forwarded_response;

/// Failure reported by the upstream provider, or synthesized when no
/// response arrived at all.
///
/// `raw_body` and `headers` are replayed to a passthrough client untouched;
/// `body` is the parsed form used for logs and in-stream error frames.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Upstream error: status={}, message={}", .status.as_u16(), upstream_error_message(.body))]
pub struct UpstreamError {
    pub status: http::StatusCode,
    pub body: Value,
    pub raw_body: Bytes,
    pub headers: http::HeaderMap,
}

impl UpstreamError {
    /// An error whose body is a JSON value produced locally.
    #[must_use]
    pub fn json(status: http::StatusCode, body: Value) -> Self {
        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        Self {
            status,
            raw_body: Bytes::from(body.to_string()),
            body,
            headers,
        }
    }

    /// Build an error for a request that never produced an upstream response.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::json(
            http::StatusCode::BAD_GATEWAY,
            openai_error_payload(ErrorCategory::ServerError, &message.into()),
        )
    }
}

impl IntoResponse for UpstreamError {
    fn into_response(self) -> Response {
        forwarded_response(self.status, self.headers, self.raw_body)
    }
}

/// Error type shared by the classifier, upstream adapter, and emulator.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    ServerMisconfigured(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("Emulation error: {0}")]
    Internal(String),
}

/// Broad error category for status code and `type` selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    ServerError,
    Upstream,
}

impl ProxyError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProxyError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            ProxyError::ServerMisconfigured(_) | ProxyError::Internal(_) => {
                ErrorCategory::ServerError
            }
            ProxyError::Upstream(_) => ErrorCategory::Upstream,
        }
    }

    /// Status code and JSON body used before any stream headers are sent.
    ///
    /// Upstream errors keep the provider's status; the HTTP response replays
    /// their raw body instead of this value.
    #[must_use]
    pub fn status_and_body(&self) -> (http::StatusCode, Value) {
        match self {
            ProxyError::Upstream(err) => (err.status, err.body.clone()),
            ProxyError::InvalidRequest(message) => (
                http::StatusCode::BAD_REQUEST,
                openai_error_payload(self.category(), message),
            ),
            ProxyError::ServerMisconfigured(_) | ProxyError::Internal(_) => (
                http::StatusCode::INTERNAL_SERVER_ERROR,
                openai_error_payload(self.category(), &self.to_string()),
            ),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            ProxyError::Upstream(err) => err.into_response(),
            other => {
                let (status, body) = other.status_and_body();
                (status, axum::Json(body)).into_response()
            }
        }
    }
}
