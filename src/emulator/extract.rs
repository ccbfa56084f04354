use serde_json::Value;

const DEFAULT_FINISH_REASON: &str = "stop";

/// Where the streamed text was found in the upstream body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    /// `choices[0].message.content`
    MessageContent,
    /// `choices[0].text` (legacy completions shape)
    LegacyText,
    /// The whole body was a bare string (non-JSON upstream reply).
    RawString,
    /// Nothing recognizable; the serialized body is streamed instead.
    SerializedBody,
}

/// Everything the emulator needs from a completed upstream body.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedCompletion {
    pub content: String,
    pub source: ContentSource,
    pub finish_reason: String,
    pub id: Option<String>,
    pub model: Option<String>,
    pub created: Option<u64>,
    pub usage: Option<Value>,
    pub tool_calls: Vec<Value>,
}

/// Pull streamable content out of an upstream completion body.
///
/// Lookup order: message content, legacy `text`, a bare string body, and
/// finally the serialized body. The last case means the upstream schema did
/// not match and is logged at warn level.
#[must_use]
pub fn extract_completion(body: &Value) -> ExtractedCompletion {
    let first_choice = body
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first());
    let message = first_choice.and_then(|choice| choice.get("message"));

    let tool_calls: Vec<Value> = message
        .and_then(|message| message.get("tool_calls"))
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .map(|(index, call)| with_index(call, index))
                .collect()
        })
        .unwrap_or_default();

    let (content, source) = if let Some(text) = message.and_then(message_text) {
        (text, ContentSource::MessageContent)
    } else if !tool_calls.is_empty() {
        (String::new(), ContentSource::MessageContent)
    } else if let Some(text) = first_choice
        .and_then(|choice| choice.get("text"))
        .and_then(Value::as_str)
    {
        (text.to_owned(), ContentSource::LegacyText)
    } else if let Some(text) = body.as_str() {
        (text.to_owned(), ContentSource::RawString)
    } else {
        tracing::warn!(
            "upstream body has no recognizable completion content; streaming the raw JSON (possible schema mismatch)"
        );
        (body.to_string(), ContentSource::SerializedBody)
    };

    ExtractedCompletion {
        content,
        source,
        finish_reason: first_choice
            .and_then(|choice| choice.get("finish_reason"))
            .and_then(Value::as_str)
            .filter(|reason| !reason.is_empty())
            .unwrap_or(DEFAULT_FINISH_REASON)
            .to_owned(),
        id: string_field(body, "id"),
        model: string_field(body, "model"),
        created: body.get("created").and_then(Value::as_u64),
        usage: body.get("usage").filter(|usage| usage.is_object()).cloned(),
        tool_calls,
    }
}

/// Message content as text: a string, or the `text` parts of a content array.
fn message_text(message: &Value) -> Option<String> {
    match message.get("content")? {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            (!texts.is_empty()).then(|| texts.concat())
        }
        _ => None,
    }
}

fn string_field(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

fn with_index(call: &Value, index: usize) -> Value {
    let mut call = call.clone();
    if let Some(object) = call.as_object_mut() {
        object
            .entry("index")
            .or_insert_with(|| Value::from(index));
    }
    call
}
