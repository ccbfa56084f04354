use serde_json::Value;

use crate::error::ErrorCategory;

fn openai_error_type(cat: ErrorCategory) -> &'static str {
    match cat {
        ErrorCategory::InvalidRequest => "invalid_request_error",
        ErrorCategory::ServerError => "server_error",
        ErrorCategory::Upstream => "upstream_error",
    }
}

#[must_use]
pub(crate) fn openai_error_payload(cat: ErrorCategory, message: &str) -> Value {
    serde_json::json!({
        "error": {
            "message": message,
            "type": openai_error_type(cat),
            "param": null,
            "code": null,
        }
    })
}

/// Pull a human-readable message out of an upstream error body.
///
/// Accepts `{"error":{"message":..}}`, `{"error":".."}`, `{"message":..}`,
/// a bare JSON string, and falls back to the serialized body.
#[must_use]
pub(crate) fn upstream_error_message(body: &Value) -> String {
    const MAX_LEN: usize = 500;

    let message = match body {
        Value::String(text) => text.clone(),
        Value::Object(map) => match map.get("error") {
            Some(Value::Object(error)) => error
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| Value::Object(error.clone()).to_string(), str::to_owned),
            Some(Value::String(text)) => text.clone(),
            _ => map
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| body.to_string(), str::to_owned),
        },
        Value::Null => String::new(),
        other => other.to_string(),
    };

    truncate_chars(message, MAX_LEN)
}

/// Build the payload of an in-stream error frame for an upstream failure.
///
/// The provider's own `error.type` and `error.code` are kept when present.
#[must_use]
pub(crate) fn upstream_stream_error_payload(status: u16, body: &Value) -> Value {
    let provider_error = body.get("error").and_then(Value::as_object);
    let error_type = provider_error
        .and_then(|error| error.get("type"))
        .and_then(Value::as_str)
        .unwrap_or_else(|| openai_error_type(ErrorCategory::Upstream));
    let code = provider_error
        .and_then(|error| error.get("code"))
        .filter(|code| !code.is_null())
        .cloned()
        .unwrap_or_else(|| Value::from(status));

    serde_json::json!({
        "error": {
            "message": upstream_error_message(body),
            "type": error_type,
            "code": code,
            "status": status,
        }
    })
}

fn truncate_chars(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_openai_error_payload_shape() {
        let payload = openai_error_payload(ErrorCategory::InvalidRequest, "bad");
        assert_eq!(payload["error"]["type"], "invalid_request_error");
        assert_eq!(payload["error"]["message"], "bad");
    }

    #[test]
    fn test_upstream_error_message_variants() {
        assert_eq!(
            upstream_error_message(&json!({"error": {"message": "overloaded"}})),
            "overloaded"
        );
        assert_eq!(upstream_error_message(&json!({"error": "nope"})), "nope");
        assert_eq!(upstream_error_message(&json!({"message": "m"})), "m");
        assert_eq!(upstream_error_message(&json!("raw text")), "raw text");
        assert_eq!(upstream_error_message(&json!({"x": 1})), "{\"x\":1}");
    }

    #[test]
    fn test_upstream_error_message_truncates_on_char_boundary() {
        let long = "é".repeat(600);
        let message = upstream_error_message(&json!({"error": {"message": long}}));
        assert!(message.ends_with("..."));
        assert_eq!(message.chars().count(), 503);
    }

    #[test]
    fn test_stream_error_payload_keeps_provider_fields() {
        let payload = upstream_stream_error_payload(
            429,
            &json!({"error": {"message": "slow down", "type": "rate_limit_error", "code": "rate_limited"}}),
        );
        assert_eq!(payload["error"]["message"], "slow down");
        assert_eq!(payload["error"]["type"], "rate_limit_error");
        assert_eq!(payload["error"]["code"], "rate_limited");
        assert_eq!(payload["error"]["status"], 429);
    }

    #[test]
    fn test_stream_error_payload_defaults() {
        let payload = upstream_stream_error_payload(503, &json!({"error": {"message": "overloaded"}}));
        assert_eq!(payload["error"]["type"], "upstream_error");
        assert_eq!(payload["error"]["code"], 503);
    }
}
