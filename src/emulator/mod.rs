//! Fake-stream emulation: turns one complete upstream completion into a paced
//! `chat.completion.chunk` SSE stream, keeping the client alive with
//! heartbeats while the upstream call is pending.

mod extract;

pub use extract::{extract_completion, ContentSource, ExtractedCompletion};

use std::future::Future;
use std::time::{Duration, Instant};

use crate::config::{ChunkUnit, StreamingConfig};
use crate::error::{ErrorCategory, UpstreamError};
use crate::protocol::error_shapes::{openai_error_payload, upstream_stream_error_payload};
use crate::protocol::{ChunkDelta, SseChunk};
use crate::stream::sse::{chunk_frame, data_frame, done_frame};
use crate::stream::{chunk_text, FrameSink, HeartbeatTimer};
use crate::transport::UpstreamResult;
use crate::util::unix_now_secs;

/// Pacing and chunking parameters for one session.
#[derive(Debug, Clone)]
pub struct EmulationConfig {
    pub heartbeat_interval: Duration,
    pub chunk_unit: ChunkUnit,
    pub chunk_size: usize,
    pub chunk_delay: Duration,
    pub chunk_jitter: Duration,
}

impl From<&StreamingConfig> for EmulationConfig {
    fn from(config: &StreamingConfig) -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(config.heartbeat_interval_ms),
            chunk_unit: config.chunk_unit,
            chunk_size: config.chunk_size,
            chunk_delay: Duration::from_millis(config.chunk_delay_ms),
            chunk_jitter: Duration::from_millis(config.chunk_jitter_ms),
        }
    }
}

impl EmulationConfig {
    /// Delay before the next fragment: base delay plus or minus a uniform
    /// jitter.
    fn next_delay(&self) -> Duration {
        let jitter_ms = u64::try_from(self.chunk_jitter.as_millis()).unwrap_or(u64::MAX);
        if jitter_ms == 0 {
            return self.chunk_delay;
        }
        let offset = Duration::from_millis(fastrand::u64(0..=jitter_ms));
        if fastrand::bool() {
            self.chunk_delay.saturating_add(offset)
        } else {
            self.chunk_delay.saturating_sub(offset)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmulationState {
    Init,
    AwaitingUpstream,
    StreamingChunks,
    Finalizing,
    Closed,
    Aborted,
}

/// How a session ended. Exactly one outcome per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// All fragments, the closing chunk and `[DONE]` were written.
    Completed { content_chunks: usize },
    /// The upstream failed; an error frame and `[DONE]` were written.
    UpstreamFailed { status: u16 },
    /// Emission failed after the upstream succeeded; an error frame and
    /// `[DONE]` were written.
    Failed,
    /// The client went away. Not an error.
    Aborted,
}

enum EmitError {
    Closed,
    Encode(serde_json::Error),
}

impl From<crate::stream::SinkClosed> for EmitError {
    fn from(_: crate::stream::SinkClosed) -> Self {
        EmitError::Closed
    }
}

/// One client connection's emulated stream.
///
/// Owns the write half of the client body and, while the upstream call is
/// pending, the heartbeat timer. Consumed by [`EmulationSession::run`]; the
/// sink is released when `run` returns, which ends the client body.
pub struct EmulationSession {
    request_id: String,
    model: String,
    sink: FrameSink,
    config: EmulationConfig,
    state: EmulationState,
    heartbeat_ticks: u64,
}

impl EmulationSession {
    #[must_use]
    pub fn new(
        sink: FrameSink,
        config: EmulationConfig,
        request_id: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            model: model.into(),
            sink,
            config,
            state: EmulationState::Init,
            heartbeat_ticks: 0,
        }
    }

    /// Drive the session to completion.
    ///
    /// `upstream_call` is the pending upstream request. It is dropped
    /// unfinished if the client disconnects first.
    pub async fn run<F>(mut self, upstream_call: F) -> SessionOutcome
    where
        F: Future<Output = Result<UpstreamResult, UpstreamError>>,
    {
        let started = Instant::now();
        let outcome = self.drive(upstream_call).await;
        self.transition(if outcome == SessionOutcome::Aborted {
            EmulationState::Aborted
        } else {
            EmulationState::Closed
        });

        match &outcome {
            SessionOutcome::Aborted => tracing::info!(
                request_id = %self.request_id,
                heartbeats = self.heartbeat_ticks,
                elapsed_ms = started.elapsed().as_millis(),
                "client disconnected; emulated stream abandoned"
            ),
            _ => tracing::info!(
                request_id = %self.request_id,
                outcome = ?outcome,
                heartbeats = self.heartbeat_ticks,
                elapsed_ms = started.elapsed().as_millis(),
                "emulated stream finished"
            ),
        }
        outcome
    }

    async fn drive<F>(&mut self, upstream_call: F) -> SessionOutcome
    where
        F: Future<Output = Result<UpstreamResult, UpstreamError>>,
    {
        let Some(result) = self.await_upstream(upstream_call).await else {
            return SessionOutcome::Aborted;
        };

        let completion = match result {
            Ok(completion) => completion,
            Err(err) => return self.fail_upstream(&err).await,
        };

        self.transition(EmulationState::StreamingChunks);
        let extracted = extract_completion(&completion.body);
        tracing::debug!(
            request_id = %self.request_id,
            content_source = ?extracted.source,
            content_bytes = extracted.content.len(),
            tool_calls = extracted.tool_calls.len(),
            "upstream completion extracted"
        );
        match self.emit_completion(&extracted).await {
            Ok(content_chunks) => SessionOutcome::Completed { content_chunks },
            Err(EmitError::Closed) => SessionOutcome::Aborted,
            // `SseChunk` holds only strings and `Value`s, so encoding does not
            // fail in practice.
            Err(EmitError::Encode(err)) => self.fail_internal(&err.to_string()).await,
        }
    }

    /// Wait for the upstream with the heartbeat running. `None` means the
    /// client disconnected first.
    ///
    /// The heartbeat is stopped here, on the only path out of the wait, before
    /// anything else is written.
    async fn await_upstream<F>(
        &mut self,
        upstream_call: F,
    ) -> Option<Result<UpstreamResult, UpstreamError>>
    where
        F: Future<Output = Result<UpstreamResult, UpstreamError>>,
    {
        self.transition(EmulationState::AwaitingUpstream);
        let heartbeat = HeartbeatTimer::start(self.sink.clone(), self.config.heartbeat_interval);

        let result = tokio::select! {
            biased;
            () = self.sink.closed() => None,
            result = upstream_call => Some(result),
        };

        self.heartbeat_ticks = heartbeat.stop().await;
        result
    }

    async fn emit_completion(
        &mut self,
        extracted: &ExtractedCompletion,
    ) -> Result<usize, EmitError> {
        let id = extracted
            .id
            .clone()
            .unwrap_or_else(|| self.request_id.clone());
        let model = extracted.model.as_deref().unwrap_or(&self.model).to_owned();
        let created = extracted.created.unwrap_or_else(unix_now_secs);

        let fragments = chunk_text(
            &extracted.content,
            self.config.chunk_unit,
            self.config.chunk_size,
        );
        let total = fragments.len();
        for (position, fragment) in fragments.into_iter().enumerate() {
            let delta = ChunkDelta {
                role: (position == 0).then(|| "assistant".to_owned()),
                content: Some(fragment.to_owned()),
                tool_calls: None,
            };
            self.write_chunk(&SseChunk::content(&id, created, &model, delta))
                .await?;
            if position + 1 < total {
                self.pace().await?;
            }
        }

        if !extracted.tool_calls.is_empty() {
            let delta = ChunkDelta {
                tool_calls: Some(extracted.tool_calls.clone()),
                ..ChunkDelta::default()
            };
            self.write_chunk(&SseChunk::content(&id, created, &model, delta))
                .await?;
        }

        self.transition(EmulationState::Finalizing);
        let closing = SseChunk::finish(
            &id,
            created,
            &model,
            &extracted.finish_reason,
            extracted.usage.clone(),
        );
        self.write_chunk(&closing).await?;
        self.write(done_frame()).await?;
        Ok(total)
    }

    async fn write_chunk(&self, chunk: &SseChunk) -> Result<(), EmitError> {
        let frame = chunk_frame(chunk).map_err(EmitError::Encode)?;
        self.write(frame).await
    }

    async fn write(&self, frame: bytes::Bytes) -> Result<(), EmitError> {
        if self.sink.is_closed() {
            return Err(EmitError::Closed);
        }
        self.sink.send(frame).await?;
        Ok(())
    }

    async fn pace(&self) -> Result<(), EmitError> {
        let delay = self.config.next_delay();
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            () = tokio::time::sleep(delay) => Ok(()),
            () = self.sink.closed() => Err(EmitError::Closed),
        }
    }

    async fn fail_upstream(&mut self, err: &UpstreamError) -> SessionOutcome {
        tracing::warn!(
            request_id = %self.request_id,
            status = err.status.as_u16(),
            error = %err,
            "upstream failed during emulated stream"
        );
        let payload = upstream_stream_error_payload(err.status.as_u16(), &err.body);
        match self.write_error_and_done(&payload).await {
            Ok(()) => SessionOutcome::UpstreamFailed {
                status: err.status.as_u16(),
            },
            Err(_) => SessionOutcome::Aborted,
        }
    }

    async fn fail_internal(&mut self, message: &str) -> SessionOutcome {
        tracing::error!(
            request_id = %self.request_id,
            error = %message,
            "failed to emit emulated stream"
        );
        let payload = openai_error_payload(
            ErrorCategory::ServerError,
            &format!("Emulation error: {message}"),
        );
        match self.write_error_and_done(&payload).await {
            Ok(()) => SessionOutcome::Failed,
            Err(_) => SessionOutcome::Aborted,
        }
    }

    async fn write_error_and_done(&self, payload: &serde_json::Value) -> Result<(), EmitError> {
        self.write(data_frame(&payload.to_string())).await?;
        self.write(done_frame()).await
    }

    fn transition(&mut self, next: EmulationState) {
        tracing::debug!(
            request_id = %self.request_id,
            from = ?self.state,
            to = ?next,
            "emulation state transition"
        );
        self.state = next;
    }
}
