use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::Value;

use crate::config::{ServerConfig, UpstreamConfig};
use crate::error::{ProxyError, UpstreamError};

const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Upstream response headers copied onto a passthrough reply.
const FORWARDED_HEADERS: &[&str] = &["content-type", "x-request-id"];

/// Completed upstream response with a 2xx status.
#[derive(Debug, Clone)]
pub struct UpstreamResult {
    pub status: http::StatusCode,
    /// Parsed body; a body that is not JSON becomes a JSON string.
    pub body: Value,
    /// The body exactly as received, for passthrough.
    pub raw_body: Bytes,
    /// The subset of upstream headers a passthrough reply carries.
    pub headers: http::HeaderMap,
}

impl IntoResponse for UpstreamResult {
    fn into_response(self) -> Response {
        forwarded_response(self.status, self.headers, self.raw_body)
    }
}

/// Replay an upstream reply: status, forwarded headers and the body bytes as
/// received. A reply without a content type is labelled JSON.
pub(crate) fn forwarded_response(
    status: http::StatusCode,
    headers: http::HeaderMap,
    body: Bytes,
) -> Response {
    let mut response = Response::new(axum::body::Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
        .headers_mut()
        .entry(http::header::CONTENT_TYPE)
        .or_insert(http::HeaderValue::from_static("application/json"));
    response
}

fn forwardable_headers(upstream: &http::HeaderMap) -> http::HeaderMap {
    let mut headers = http::HeaderMap::with_capacity(FORWARDED_HEADERS.len());
    for name in FORWARDED_HEADERS {
        if let Some(value) = upstream.get(*name) {
            headers.insert(http::HeaderName::from_static(name), value.clone());
        }
    }
    headers
}

/// Build the chat-completions endpoint for a base URL.
///
/// Accepts base URLs with or without a trailing `/v1`.
#[must_use]
pub fn chat_completions_url(base_url: &str) -> String {
    let base = base_url.trim().trim_end_matches('/');
    if base.ends_with("/v1") {
        format!("{base}/chat/completions")
    } else {
        format!("{base}{CHAT_COMPLETIONS_PATH}")
    }
}

fn build_reqwest_client(server: &ServerConfig) -> Result<reqwest::Client, ProxyError> {
    let pool_idle_timeout = if server.http_pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(server.http_pool_idle_timeout_secs))
    };

    reqwest::Client::builder()
        .pool_max_idle_per_host(server.http_pool_max_idle_per_host.max(1))
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(server.connect_timeout))
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(server.timeout))
        .build()
        .map_err(|err| {
            ProxyError::ServerMisconfigured(format!("Failed to build HTTP client: {err}"))
        })
}

/// Single-attempt JSON client for the upstream chat-completion endpoint.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    endpoint: Arc<url::Url>,
}

impl UpstreamClient {
    /// # Errors
    ///
    /// Returns [`ProxyError::ServerMisconfigured`] when the endpoint URL is
    /// invalid or the HTTP client cannot be built.
    pub fn new(upstream: &UpstreamConfig, server: &ServerConfig) -> Result<Self, ProxyError> {
        let endpoint = chat_completions_url(&upstream.base_url);
        let endpoint = url::Url::parse(&endpoint).map_err(|err| {
            ProxyError::ServerMisconfigured(format!("Invalid upstream URL '{endpoint}': {err}"))
        })?;
        Ok(Self {
            http: build_reqwest_client(server)?,
            endpoint: Arc::new(endpoint),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }

    /// POST `body` to the upstream with the given bearer credential.
    ///
    /// There is no retry: exactly one attempt is made per call. Dropping the
    /// returned future aborts the in-flight request.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] carrying the upstream status and body for a
    /// non-2xx response, or a synthetic `502` when no response arrived.
    pub async fn call(
        &self,
        body: Bytes,
        credential: &str,
    ) -> Result<UpstreamResult, UpstreamError> {
        let started = Instant::now();
        let response = self
            .http
            .post(self.endpoint.as_ref().clone())
            .bearer_auth(credential)
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(http::header::ACCEPT, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|err| network_error(&err))?;

        let status = response.status();
        let headers = forwardable_headers(response.headers());
        let raw_body = response.bytes().await.map_err(|err| network_error(&err))?;
        let body = parse_body(&raw_body);

        tracing::debug!(
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis(),
            body_bytes = raw_body.len(),
            "upstream call completed"
        );

        if !status.is_success() {
            return Err(UpstreamError {
                status,
                body,
                raw_body,
                headers,
            });
        }

        Ok(UpstreamResult {
            status,
            body,
            raw_body,
            headers,
        })
    }
}

fn parse_body(raw: &[u8]) -> Value {
    serde_json::from_slice(raw)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(raw).into_owned()))
}

fn network_error(err: &reqwest::Error) -> UpstreamError {
    let message = if err.is_timeout() {
        format!("Upstream request timed out: {err}")
    } else if err.is_connect() {
        format!("Failed to connect to upstream: {err}")
    } else {
        format!("Upstream request failed: {err}")
    };
    tracing::warn!(error = %err, "upstream request produced no response");
    UpstreamError::network(message)
}
