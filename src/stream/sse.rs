/// SSE (Server-Sent Events) frame encoder and parser.
///
/// The encoder produces the frames the emulator writes to clients; the
/// parser reads them back, line by line, per the
/// [SSE specification](https://html.spec.whatwg.org/multipage/server-sent-events.html).
use bytes::Bytes;

use crate::protocol::SseChunk;

pub const DONE_FRAME: &str = "data: [DONE]\n\n";
pub const HEARTBEAT_FRAME: &str = ": heartbeat\n\n";

/// A parsed SSE event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

/// One unit read off an SSE stream: a dispatched event or a comment line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseRecord {
    Comment(String),
    Event(SseEvent),
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

/// Format a `data:` frame (no event type).
#[must_use]
pub fn data_frame(payload: &str) -> Bytes {
    let mut out = String::with_capacity(8 + payload.len());
    out.push_str("data: ");
    out.push_str(payload);
    out.push_str("\n\n");
    Bytes::from(out)
}

/// Serialize a chunk and wrap it in a `data:` frame.
///
/// # Errors
///
/// Returns the serializer error if the chunk cannot be encoded.
pub fn chunk_frame(chunk: &SseChunk) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(chunk)?;
    Ok(data_frame(&json))
}

#[must_use]
pub fn heartbeat_frame() -> Bytes {
    Bytes::from_static(HEARTBEAT_FRAME.as_bytes())
}

#[must_use]
pub fn done_frame() -> Bytes {
    Bytes::from_static(DONE_FRAME.as_bytes())
}

// ---------------------------------------------------------------------------
// SseParser
// ---------------------------------------------------------------------------

/// Incremental SSE line parser.
///
/// Feed it text in arbitrary pieces; it yields comments as they complete and
/// events when their terminating blank line arrives.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    event_type: Option<String>,
    data_buffer: String,
    has_data: bool,
    last_event_id: Option<String>,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw text and return any complete records parsed.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseRecord> {
        self.buffer.push_str(chunk);
        let mut out = Vec::new();
        while let Some(line_end) = self.buffer.find('\n') {
            let mut line: String = self.buffer.drain(..=line_end).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            self.process_line(&line, &mut out);
        }
        out
    }

    fn process_line(&mut self, line: &str, out: &mut Vec<SseRecord>) {
        if line.is_empty() {
            if self.has_data {
                out.push(SseRecord::Event(SseEvent {
                    event: self.event_type.take(),
                    data: std::mem::take(&mut self.data_buffer),
                    id: self.last_event_id.clone(),
                }));
                self.has_data = false;
            }
            return;
        }

        if let Some(comment) = line.strip_prefix(':') {
            out.push(SseRecord::Comment(comment.trim_start().to_owned()));
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => {
                if self.has_data {
                    self.data_buffer.push('\n');
                } else {
                    self.has_data = true;
                }
                self.data_buffer.push_str(value);
            }
            "event" => self.event_type = Some(value.to_owned()),
            "id" => self.last_event_id = Some(value.to_owned()),
            // `retry` and unknown fields are ignored
            _ => {}
        }
    }
}

/// Parse a complete SSE body in one go.
#[must_use]
pub fn parse_sse_body(body: &str) -> Vec<SseRecord> {
    SseParser::new().feed(body)
}
