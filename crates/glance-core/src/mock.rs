//! In-memory capture backend for lifecycle tests.
//!
//! Acquisitions can be held open with per-request gates so tests decide the
//! order in which concurrent requests resolve.

use crate::backend::{CaptureBackend, StreamHandle};
use crate::error::CameraError;
use crate::frame::Frame;
use crate::status::{StatusEvent, StatusSink};
use crate::types::{Constraints, Facing, PermissionState};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Default)]
struct Shared {
    unsupported: AtomicBool,
    gated: AtomicBool,
    dark: AtomicBool,
    requests: Mutex<Vec<Facing>>,
    gates: Mutex<Vec<Option<oneshot::Sender<()>>>>,
    failures: Mutex<VecDeque<CameraError>>,
    substitute: Mutex<Option<Facing>>,
    permission: Mutex<Option<PermissionState>>,
    live: AtomicUsize,
    max_live: AtomicUsize,
    read_delay: Mutex<Option<Duration>>,
    releases: AtomicUsize,
    leaked: AtomicUsize,
    reads: AtomicUsize,
}

#[derive(Clone, Default)]
pub(crate) struct MockBackend {
    shared: Arc<Shared>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unsupported() -> Self {
        let backend = Self::default();
        backend.shared.unsupported.store(true, Ordering::SeqCst);
        backend
    }

    /// Hold every following acquisition until [`release`](Self::release) is called.
    pub fn set_gated(&self, gated: bool) {
        self.shared.gated.store(gated, Ordering::SeqCst);
    }

    /// Let the `index`-th gated acquisition (in request order) resolve.
    pub fn release(&self, index: usize) {
        let gate = self.shared.gates.lock().unwrap()[index].take();
        if let Some(tx) = gate {
            let _ = tx.send(());
        }
    }

    /// Yield until at least `n` gated acquisitions are waiting.
    pub async fn wait_pending(&self, n: usize) {
        while self.shared.gates.lock().unwrap().len() < n {
            tokio::task::yield_now().await;
        }
    }

    /// Make every frame read from now on come back black.
    pub fn set_dark(&self, dark: bool) {
        self.shared.dark.store(dark, Ordering::SeqCst);
    }

    /// Make every frame read block the calling thread for `delay`, like a
    /// V4L2 dequeue waiting on the sensor.
    pub fn set_read_delay(&self, delay: Duration) {
        *self.shared.read_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_next(&self, err: CameraError) {
        self.shared.failures.lock().unwrap().push_back(err);
    }

    /// Pretend the only camera available faces `facing`.
    pub fn substitute(&self, facing: Facing) {
        *self.shared.substitute.lock().unwrap() = Some(facing);
    }

    pub fn set_permission(&self, state: PermissionState) {
        *self.shared.permission.lock().unwrap() = Some(state);
    }

    pub fn requests(&self) -> Vec<Facing> {
        self.shared.requests.lock().unwrap().clone()
    }

    pub fn live(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Most streams ever live at the same time.
    pub fn max_live(&self) -> usize {
        self.shared.max_live.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.shared.releases.load(Ordering::SeqCst)
    }

    pub fn leaked(&self) -> usize {
        self.shared.leaked.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.shared.reads.load(Ordering::SeqCst)
    }
}

impl CaptureBackend for MockBackend {
    type Stream = MockStream;

    fn is_supported(&self) -> bool {
        !self.shared.unsupported.load(Ordering::SeqCst)
    }

    fn request_stream(
        &self,
        constraints: Constraints,
    ) -> impl Future<Output = Result<MockStream, CameraError>> + Send {
        let shared = self.shared.clone();
        async move {
            shared.requests.lock().unwrap().push(constraints.facing);

            if shared.gated.load(Ordering::SeqCst) {
                let (tx, rx) = oneshot::channel();
                shared.gates.lock().unwrap().push(Some(tx));
                let _ = rx.await;
            }

            if let Some(err) = shared.failures.lock().unwrap().pop_front() {
                return Err(err);
            }

            let facing = shared
                .substitute
                .lock()
                .unwrap()
                .unwrap_or(constraints.facing);
            let live = shared.live.fetch_add(1, Ordering::SeqCst) + 1;
            shared.max_live.fetch_max(live, Ordering::SeqCst);
            Ok(MockStream {
                shared: shared.clone(),
                facing,
                label: format!("mock-{facing}"),
                stopped: false,
                sequence: 0,
            })
        }
    }

    fn permission_state(&self) -> impl Future<Output = PermissionState> + Send {
        let state = self
            .shared
            .permission
            .lock()
            .unwrap()
            .unwrap_or(PermissionState::Prompt);
        async move { state }
    }
}

pub(crate) struct MockStream {
    shared: Arc<Shared>,
    facing: Facing,
    label: String,
    stopped: bool,
    sequence: u32,
}

impl StreamHandle for MockStream {
    fn facing(&self) -> Facing {
        self.facing
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        if self.stopped {
            return Err(CameraError::CaptureFailed("tracks stopped".into()));
        }
        let delay = *self.shared.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.shared.reads.fetch_add(1, Ordering::SeqCst);
        self.sequence += 1;
        let level = if self.shared.dark.load(Ordering::SeqCst) { 0 } else { 128 };
        Ok(Frame::from_gray(vec![level; 16], 4, 4, self.sequence))
    }

    fn stop_all_tracks(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.shared.live.fetch_sub(1, Ordering::SeqCst);
        self.shared.releases.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        if !self.stopped {
            self.shared.leaked.fetch_add(1, Ordering::SeqCst);
            self.shared.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Status sink that keeps every event for later assertions.
#[derive(Clone, Default)]
pub(crate) struct RecordingSink {
    events: Arc<Mutex<Vec<StatusEvent>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<StatusEvent> {
        self.events().into_iter().filter(|e| e.is_error()).collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.message).collect()
    }
}

impl StatusSink for RecordingSink {
    fn emit(&self, event: StatusEvent) {
        self.events.lock().unwrap().push(event);
    }
}
