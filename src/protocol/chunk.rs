use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CHUNK_OBJECT: &str = "chat.completion.chunk";

/// One `chat.completion.chunk` frame of an emulated stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SseChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    /// Serialized as `null` on every frame except the closing one.
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<Value>>,
}

impl SseChunk {
    fn with_choice(id: &str, created: u64, model: &str, choice: ChunkChoice) -> Self {
        Self {
            id: id.to_owned(),
            object: CHUNK_OBJECT.to_owned(),
            created,
            model: model.to_owned(),
            choices: vec![choice],
            usage: None,
        }
    }

    /// A content-bearing frame with `finish_reason: null`.
    #[must_use]
    pub fn content(id: &str, created: u64, model: &str, delta: ChunkDelta) -> Self {
        Self::with_choice(
            id,
            created,
            model,
            ChunkChoice {
                index: 0,
                delta,
                finish_reason: None,
            },
        )
    }

    /// The closing frame: empty delta plus the finish reason.
    #[must_use]
    pub fn finish(
        id: &str,
        created: u64,
        model: &str,
        finish_reason: &str,
        usage: Option<Value>,
    ) -> Self {
        let mut chunk = Self::with_choice(
            id,
            created,
            model,
            ChunkChoice {
                index: 0,
                delta: ChunkDelta::default(),
                finish_reason: Some(finish_reason.to_owned()),
            },
        );
        chunk.usage = usage;
        chunk
    }

    #[must_use]
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.finish_reason.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_chunk_wire_shape() {
        let chunk = SseChunk::content(
            "chatcmpl-1",
            1_700_000_000,
            "m",
            ChunkDelta {
                content: Some("hi".into()),
                ..ChunkDelta::default()
            },
        );
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion.chunk",
                "created": 1_700_000_000_u64,
                "model": "m",
                "choices": [{"index": 0, "delta": {"content": "hi"}, "finish_reason": null}]
            })
        );
    }

    #[test]
    fn test_finish_chunk_has_empty_delta() {
        let chunk = SseChunk::finish("id", 1, "m", "stop", Some(json!({"total_tokens": 3})));
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value["choices"][0]["delta"], json!({}));
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
        assert_eq!(value["usage"]["total_tokens"], 3);
        assert_eq!(chunk.finish_reason(), Some("stop"));
    }
}
