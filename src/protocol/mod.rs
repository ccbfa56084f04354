//! OpenAI chat-completion wire types used on both sides of the proxy.
//!
//! Inbound requests stay untyped JSON so fields the proxy does not interpret
//! reach the upstream exactly as the client sent them.

pub mod chunk;
pub(crate) mod error_shapes;

pub use chunk::{ChunkChoice, ChunkDelta, SseChunk, CHUNK_OBJECT};

/// Sampling temperature sent upstream when the client leaves it unset.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
