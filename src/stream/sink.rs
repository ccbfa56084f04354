use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;

/// Returned when the client side of an emulated stream has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("client stream closed")]
pub struct SinkClosed;

/// Write half of a client-facing SSE body.
///
/// The read half ([`FrameStream`]) is owned by the HTTP response body; when
/// the connection drops, hyper drops the body and every sink observes
/// [`FrameSink::is_closed`]. That closure is the session's cancellation signal.
#[derive(Debug, Clone)]
pub struct FrameSink {
    tx: mpsc::Sender<Bytes>,
}

impl FrameSink {
    /// Create a bounded sink/stream pair.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, FrameStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, FrameStream { rx })
    }

    /// Write one frame, waiting for buffer space.
    ///
    /// # Errors
    ///
    /// Returns [`SinkClosed`] once the client stream is gone.
    pub async fn send(&self, frame: Bytes) -> Result<(), SinkClosed> {
        self.tx.send(frame).await.map_err(|_| SinkClosed)
    }

    /// Write one frame without waiting. A full buffer drops the frame.
    ///
    /// # Errors
    ///
    /// Returns the channel error for a full or closed stream.
    pub fn try_send(&self, frame: Bytes) -> Result<(), mpsc::error::TrySendError<Bytes>> {
        self.tx.try_send(frame)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the client stream has been dropped.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}

/// Read half of a client-facing SSE body.
#[derive(Debug)]
pub struct FrameStream {
    rx: mpsc::Receiver<Bytes>,
}

impl FrameStream {
    #[must_use]
    pub fn into_body(self) -> axum::body::Body {
        axum::body::Body::from_stream(self)
    }

    /// Receive the next frame, or `None` once every sink has been dropped.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Drain the stream to completion and return the body as text.
    pub async fn collect_text(mut self) -> String {
        let mut out = String::new();
        while let Some(frame) = self.rx.recv().await {
            out.push_str(&String::from_utf8_lossy(&frame));
        }
        out
    }
}

impl Stream for FrameStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|frame| frame.map(Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let (sink, stream) = FrameSink::channel(4);
        sink.send(Bytes::from_static(b"a")).await.unwrap();
        sink.send(Bytes::from_static(b"b")).await.unwrap();
        drop(sink);
        assert_eq!(stream.collect_text().await, "ab");
    }

    #[tokio::test]
    async fn test_dropping_stream_closes_sink() {
        let (sink, stream) = FrameSink::channel(4);
        assert!(!sink.is_closed());
        drop(stream);
        assert!(sink.is_closed());
        sink.closed().await;
        assert_eq!(sink.send(Bytes::from_static(b"x")).await, Err(SinkClosed));
    }

    #[tokio::test]
    async fn test_try_send_reports_full_buffer() {
        let (sink, _stream) = FrameSink::channel(1);
        sink.try_send(Bytes::from_static(b"1")).unwrap();
        assert!(matches!(
            sink.try_send(Bytes::from_static(b"2")),
            Err(mpsc::error::TrySendError::Full(_))
        ));
    }
}
