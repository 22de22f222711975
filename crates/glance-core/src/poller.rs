//! Periodic frame polling bound to the `Active` session state.
//!
//! The poller parks while the session is not `Active` and runs a fixed
//! cadence timer only while it is. Leaving `Active` drops the timer; the
//! next `Active` transition creates a fresh one.

use crate::backend::CaptureBackend;
use crate::frame::Frame;
use crate::session::SessionManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Receives frames from the active stream, e.g. a face/expression detector.
pub trait FrameConsumer: Send + 'static {
    fn on_frame(&mut self, frame: &Frame);
}

impl<F> FrameConsumer for F
where
    F: FnMut(&Frame) + Send + 'static,
{
    fn on_frame(&mut self, frame: &Frame) {
        self(frame)
    }
}

/// Counters reported when a poller shuts down.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollStats {
    /// Frames handed to the consumer.
    pub frames: u64,
    /// Frames skipped because they were too dark to be useful.
    pub dark_skipped: u64,
    /// Frame reads that failed.
    pub failures: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct DetectionPoller {
    interval: Duration,
}

impl Default for DetectionPoller {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}

impl DetectionPoller {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Spawn the polling task on the current tokio runtime.
    pub fn spawn<B, C>(self, manager: Arc<SessionManager<B>>, consumer: C) -> PollerHandle
    where
        B: CaptureBackend,
        C: FrameConsumer,
    {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(run(manager, consumer, self.interval, cancel_rx));
        PollerHandle {
            cancel_tx,
            task,
        }
    }
}

/// Owner of a running poller. Dropping it also stops the task.
pub struct PollerHandle {
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<PollStats>,
}

impl PollerHandle {
    /// Cancel the task and wait for it to finish.
    pub async fn shutdown(self) -> PollStats {
        let _ = self.cancel_tx.send(true);
        match self.task.await {
            Ok(stats) => stats,
            Err(err) => {
                tracing::warn!(error = %err, "detection poller task failed");
                PollStats::default()
            }
        }
    }
}

async fn run<B, C>(
    manager: Arc<SessionManager<B>>,
    mut consumer: C,
    interval: Duration,
    mut cancel: watch::Receiver<bool>,
) -> PollStats
where
    B: CaptureBackend,
    C: FrameConsumer,
{
    let mut state_rx = manager.subscribe();
    let mut stats = PollStats::default();

    loop {
        // Parked: wait for the session to become active.
        loop {
            if *cancel.borrow() {
                return stats;
            }
            if state_rx.borrow_and_update().is_active() {
                break;
            }
            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        return stats;
                    }
                }
                res = cancel.changed() => {
                    if res.is_err() {
                        return stats;
                    }
                }
            }
        }

        tracing::debug!(interval_ms = interval.as_millis() as u64, "detection polling started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                res = cancel.changed() => {
                    if res.is_err() || *cancel.borrow() {
                        return stats;
                    }
                }
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        return stats;
                    }
                    if !state_rx.borrow_and_update().is_active() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match manager.next_frame().await {
                        None => break,
                        Some(Ok(frame)) if frame.is_dark => {
                            stats.dark_skipped += 1;
                            tracing::trace!(seq = frame.sequence, "skipping dark frame");
                        }
                        Some(Ok(frame)) => {
                            consumer.on_frame(&frame);
                            stats.frames += 1;
                        }
                        Some(Err(err)) => {
                            stats.failures += 1;
                            tracing::warn!(error = %err, "frame read failed");
                        }
                    }
                }
            }
        }

        tracing::debug!(frames = stats.frames, "detection polling paused");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, RecordingSink};
    use crate::types::Facing;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::time::sleep;

    fn counting_consumer() -> (impl FrameConsumer, Arc<AtomicU64>) {
        let count = Arc::new(AtomicU64::new(0));
        let seen = count.clone();
        let consumer = move |_frame: &Frame| {
            seen.fetch_add(1, Ordering::SeqCst);
        };
        (consumer, count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_only_while_active() {
        let backend = MockBackend::new();
        let manager = Arc::new(SessionManager::new(backend.clone(), RecordingSink::default()));
        let (consumer, count) = counting_consumer();
        let handle = DetectionPoller::default().spawn(manager.clone(), consumer);

        sleep(Duration::from_millis(350)).await;
        assert_eq!(backend.reads(), 0, "no reads while idle");

        manager.start(Facing::User).await.unwrap();
        sleep(Duration::from_millis(350)).await;
        let while_active = count.load(Ordering::SeqCst);
        assert!(while_active >= 3, "expected ~4 frames, got {while_active}");

        manager.stop();
        sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), while_active, "no frames after stop");

        let stats = handle.shutdown().await;
        assert_eq!(stats.frames, while_active);
        assert_eq!(stats.failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumes_after_restart() {
        let backend = MockBackend::new();
        let manager = Arc::new(SessionManager::new(backend.clone(), RecordingSink::default()));
        let (consumer, count) = counting_consumer();
        let handle = DetectionPoller::new(Duration::from_millis(50)).spawn(manager.clone(), consumer);

        manager.start(Facing::User).await.unwrap();
        sleep(Duration::from_millis(120)).await;
        manager.stop();
        sleep(Duration::from_millis(10)).await;
        let first_run = count.load(Ordering::SeqCst);
        assert!(first_run > 0);

        manager.start(Facing::Environment).await.unwrap();
        sleep(Duration::from_millis(120)).await;
        assert!(count.load(Ordering::SeqCst) > first_run);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dark_frames_are_skipped() {
        let backend = MockBackend::new();
        backend.set_dark(true);
        let manager = Arc::new(SessionManager::new(backend.clone(), RecordingSink::default()));
        let (consumer, count) = counting_consumer();
        let handle = DetectionPoller::default().spawn(manager.clone(), consumer);

        manager.start(Facing::User).await.unwrap();
        sleep(Duration::from_millis(250)).await;

        let stats = handle.shutdown().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(stats.frames, 0);
        assert!(stats.dark_skipped >= 2);
    }

    #[tokio::test]
    async fn test_slow_reads_do_not_stall_other_tasks() {
        let backend = MockBackend::new();
        backend.set_read_delay(Duration::from_millis(80));
        let manager = Arc::new(SessionManager::new(backend.clone(), RecordingSink::default()));
        manager.start(Facing::User).await.unwrap();
        let (consumer, count) = counting_consumer();
        let handle = DetectionPoller::new(Duration::from_millis(10)).spawn(manager.clone(), consumer);

        let began = std::time::Instant::now();
        for _ in 0..10 {
            sleep(Duration::from_millis(5)).await;
        }
        let elapsed = began.elapsed();
        assert!(
            elapsed < Duration::from_millis(400),
            "10 x 5ms sleeps took {elapsed:?} while frames were being read"
        );

        let stats = handle.shutdown().await;
        assert!(stats.frames >= 1);
        assert_eq!(count.load(Ordering::SeqCst), stats.frames);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_idle_returns_promptly() {
        let manager = Arc::new(SessionManager::new(MockBackend::new(), RecordingSink::default()));
        let (consumer, _count) = counting_consumer();
        let handle = DetectionPoller::default().spawn(manager, consumer);

        let stats = handle.shutdown().await;
        assert_eq!(stats, PollStats::default());
    }
}
