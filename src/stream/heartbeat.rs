use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::sink::FrameSink;
use super::sse::heartbeat_frame;

/// Periodic keep-alive writer tied to one pending upstream call.
///
/// `stop` consumes the timer and waits for the background task to finish, so
/// once it returns no further heartbeat can reach the sink. Dropping an
/// unstopped timer aborts the task.
#[derive(Debug)]
pub struct HeartbeatTimer {
    handle: Option<JoinHandle<()>>,
    ticks: Arc<AtomicU64>,
}

impl HeartbeatTimer {
    /// Start writing a heartbeat frame every `interval`, beginning one
    /// interval from now.
    #[must_use]
    pub fn start(sink: FrameSink, interval: Duration) -> Self {
        let ticks = Arc::new(AtomicU64::new(0));
        let handle = tokio::spawn(run_heartbeat(sink, interval, Arc::clone(&ticks)));
        Self {
            handle: Some(handle),
            ticks,
        }
    }

    /// Heartbeat frames written so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Stop the timer and return the number of heartbeats written.
    pub async fn stop(mut self) -> u64 {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            // Cancelled is the expected outcome; either way the task is gone.
            let _ = handle.await;
        }
        self.ticks()
    }
}

impl Drop for HeartbeatTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn run_heartbeat(sink: FrameSink, period: Duration, ticks: Arc<AtomicU64>) {
    let period = period.max(Duration::from_millis(1));
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        match sink.try_send(heartbeat_frame()) {
            Ok(()) => {
                ticks.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                tracing::debug!("heartbeat skipped: client stream buffer full");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("heartbeat write failed: client stream closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::sse::HEARTBEAT_FRAME;

    #[tokio::test]
    async fn test_emits_heartbeats_until_stopped() {
        let (sink, mut stream) = FrameSink::channel(16);
        let timer = HeartbeatTimer::start(sink.clone(), Duration::from_millis(10));

        let first = stream.recv().await.expect("heartbeat");
        assert_eq!(&first[..], HEARTBEAT_FRAME.as_bytes());
        tokio::time::sleep(Duration::from_millis(25)).await;

        let ticks = timer.stop().await;
        assert!(ticks >= 2, "ticks={ticks}");

        tokio::time::sleep(Duration::from_millis(40)).await;
        drop(sink);
        let mut after_first = 0;
        while stream.recv().await.is_some() {
            after_first += 1;
        }
        assert_eq!(after_first + 1, ticks);
    }

    #[tokio::test]
    async fn test_no_tick_before_first_interval() {
        let (sink, mut stream) = FrameSink::channel(4);
        let timer = HeartbeatTimer::start(sink.clone(), Duration::from_secs(60));
        assert_eq!(timer.stop().await, 0);
        drop(sink);
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_stream_does_not_stop_timer_task() {
        let (sink, stream) = FrameSink::channel(4);
        drop(stream);
        let timer = HeartbeatTimer::start(sink, Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(timer.ticks(), 0);
        assert_eq!(timer.stop().await, 0);
    }

    #[tokio::test]
    async fn test_drop_aborts_task_and_releases_sink() {
        let (sink, mut stream) = FrameSink::channel(4);
        let timer = HeartbeatTimer::start(sink, Duration::from_secs(60));
        drop(timer);
        // The task owned the only sink; once aborted the stream ends.
        assert!(stream.recv().await.is_none());
    }
}
