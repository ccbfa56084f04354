//! Request classification: validate the inbound body, resolve the credential,
//! and build the upstream body with streaming forced off.

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::config::UpstreamConfig;
use crate::error::ProxyError;
use crate::protocol::DEFAULT_TEMPERATURE;
use crate::util::bearer_token;

/// Parameters only meaningful on a streaming upstream request.
const STREAM_ONLY_FIELDS: &[&str] = &["stream_options"];

/// Result of classifying one chat-completion request.
#[derive(Debug, Clone)]
pub struct ClassifiedRequest {
    /// The client's original `stream` flag: emulate when true, pass through
    /// otherwise.
    pub wants_stream: bool,
    /// Requested model, empty when neither the client nor the config names one.
    pub model: String,
    pub credential: String,
    /// Client parameters with `stream` forced to `false`.
    pub upstream_body: Bytes,
}

/// Classify an inbound chat-completion request.
///
/// Only `messages` is validated. Every other field is forwarded as sent,
/// except `stream` (forced off), stream-only options (dropped), and
/// `temperature`/`model` defaults filled in where the client left them absent
/// or `null`.
///
/// # Errors
///
/// Returns [`ProxyError::ServerMisconfigured`] when neither the request nor
/// the server supplies a credential, and [`ProxyError::InvalidRequest`] when
/// the body is not a JSON object with a non-empty `messages` array. No
/// upstream call is made in either case.
pub fn classify_request(
    body: &[u8],
    headers: &http::HeaderMap,
    upstream: &UpstreamConfig,
) -> Result<ClassifiedRequest, ProxyError> {
    let credential = bearer_token(headers)
        .or_else(|| upstream.credential())
        .ok_or_else(|| {
            ProxyError::ServerMisconfigured(
                "Server misconfigured: upstream API key is not set".to_string(),
            )
        })?
        .to_owned();

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ProxyError::InvalidRequest(format!("Invalid JSON body: {e}")))?;
    let Value::Object(mut request) = value else {
        return Err(ProxyError::InvalidRequest(
            "Request body must be a JSON object".to_string(),
        ));
    };
    validate_messages(&request)?;

    let wants_stream = request
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    request.insert("stream".to_string(), Value::Bool(false));
    for field in STREAM_ONLY_FIELDS {
        request.remove(*field);
    }
    if request.get("temperature").map_or(true, Value::is_null) {
        request.insert("temperature".to_string(), Value::from(DEFAULT_TEMPERATURE));
    }
    let model = resolve_model(&mut request, upstream.default_model.as_deref());

    let upstream_body = serde_json::to_vec(&request)
        .map(Bytes::from)
        .map_err(|e| ProxyError::Internal(format!("Failed to encode upstream request: {e}")))?;

    Ok(ClassifiedRequest {
        wants_stream,
        model,
        credential,
        upstream_body,
    })
}

/// The client's model, or the configured default written into the request
/// when the client sent none.
fn resolve_model(request: &mut Map<String, Value>, default_model: Option<&str>) -> String {
    if let Some(model) = request
        .get("model")
        .and_then(Value::as_str)
        .filter(|model| !model.trim().is_empty())
    {
        return model.to_owned();
    }
    match default_model {
        Some(default_model) => {
            request.insert("model".to_string(), Value::from(default_model));
            default_model.to_owned()
        }
        None => String::new(),
    }
}

fn validate_messages(request: &Map<String, Value>) -> Result<(), ProxyError> {
    match request.get("messages") {
        None | Some(Value::Null) => Err(ProxyError::InvalidRequest(
            "'messages' is required".to_string(),
        )),
        Some(Value::Array(messages)) if messages.is_empty() => Err(ProxyError::InvalidRequest(
            "'messages' must not be empty".to_string(),
        )),
        Some(Value::Array(_)) => Ok(()),
        Some(_) => Err(ProxyError::InvalidRequest(
            "'messages' must be an array".to_string(),
        )),
    }
}
