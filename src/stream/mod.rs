pub mod chunker;
pub mod heartbeat;
pub mod sink;
pub mod sse;

pub use chunker::chunk_text;
pub use heartbeat::HeartbeatTimer;
pub use sink::{FrameSink, FrameStream, SinkClosed};
pub use sse::{SseEvent, SseParser, SseRecord};
