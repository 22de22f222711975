//! Camera session manager.
//!
//! States: `Idle → Starting → Active → Stopping → Idle`, plus
//! `Active → Starting` when switching cameras. Every start, switch and stop
//! bumps a generation counter. An acquisition that resolves under a stale
//! generation releases its stream instead of binding it, so at most one
//! stream is ever bound and late results never overwrite newer requests.

use crate::backend::{CaptureBackend, StreamHandle};
use crate::error::CameraError;
use crate::frame::Frame;
use crate::status::{StatusEvent, StatusSink};
use crate::types::{Constraints, Facing, PermissionState, SessionState, SessionStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::watch;
use uuid::Uuid;

/// The single bound acquisition.
struct Session<S> {
    id: Uuid,
    stream: S,
    started_at: Instant,
}

struct Inner<S> {
    state: SessionState,
    generation: u64,
    /// Facing mode of the most recent request.
    facing: Facing,
    session: Option<Session<S>>,
    /// Generation of the acquisition a stop cancelled while `Starting`.
    cancelled: Option<u64>,
}

/// Owns at most one live camera stream and serialises lifecycle requests.
///
/// Share it as `Arc<SessionManager<B>>` between UI handlers and the
/// detection poller; every operation takes `&self`.
pub struct SessionManager<B: CaptureBackend> {
    backend: B,
    sink: Arc<dyn StatusSink>,
    frame_size: Option<(u32, u32)>,
    inner: Mutex<Inner<B::Stream>>,
    state_tx: watch::Sender<SessionState>,
}

impl<B: CaptureBackend> SessionManager<B> {
    pub fn new(backend: B, sink: impl StatusSink + 'static) -> Self {
        Self::with_shared_sink(backend, Arc::new(sink))
    }

    pub fn with_shared_sink(backend: B, sink: Arc<dyn StatusSink>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            backend,
            sink,
            frame_size: None,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                generation: 0,
                facing: Facing::default(),
                session: None,
                cancelled: None,
            }),
            state_tx,
        }
    }

    /// Preferred frame size passed to the backend with every request.
    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = Some((width, height));
        self
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Facing mode of the most recent request (or preference when idle).
    pub fn facing(&self) -> Facing {
        self.lock().facing
    }

    pub fn status(&self) -> SessionStatus {
        let inner = self.lock();
        let session = inner.session.as_ref();
        SessionStatus {
            state: inner.state,
            facing: inner.facing,
            session_id: session.map(|s| s.id),
            device: session.map(|s| s.stream.label().to_string()),
            active_for_ms: session.map(|s| s.started_at.elapsed().as_millis() as u64),
        }
    }

    /// Watch lifecycle transitions. Intermediate states may be coalesced.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Acquire a camera facing `facing` and bind it.
    ///
    /// Any stream already bound is released first. A request superseded by a
    /// later start, switch or stop fails with [`CameraError::AcquisitionRace`].
    pub async fn start(&self, facing: Facing) -> Result<(), CameraError> {
        self.acquire(facing).await
    }

    /// Replace the bound stream with one facing `facing`.
    ///
    /// The old tracks are released before the new acquisition begins. When
    /// two switches overlap, only the later one binds.
    pub async fn switch_facing(&self, facing: Facing) -> Result<(), CameraError> {
        tracing::info!(%facing, "switching camera");
        self.acquire(facing).await
    }

    /// Video on/off button: stop when running or starting, otherwise start
    /// with the last requested facing mode.
    pub async fn toggle(&self) -> Result<(), CameraError> {
        let (state, facing) = {
            let inner = self.lock();
            (inner.state, inner.facing)
        };
        match state {
            SessionState::Starting | SessionState::Active => {
                self.stop();
                Ok(())
            }
            SessionState::Idle | SessionState::Stopping => self.start(facing).await,
        }
    }

    /// Facing checkbox: flip the preference, restarting the camera only if
    /// one is running or being acquired.
    pub async fn toggle_facing(&self) -> Result<(), CameraError> {
        let next = {
            let mut inner = self.lock();
            let next = inner.facing.opposite();
            if inner.state == SessionState::Idle {
                inner.facing = next;
                drop(inner);
                self.sink
                    .emit(StatusEvent::info(format!("{next} camera selected")));
                return Ok(());
            }
            next
        };
        self.switch_facing(next).await
    }

    /// Release the bound stream. Idempotent.
    ///
    /// Stopping while `Starting` returns to `Idle` immediately; the pending
    /// stream is released when its acquisition resolves.
    pub fn stop(&self) {
        let event = {
            let mut inner = self.lock();
            let state = inner.state;
            match state {
                SessionState::Idle => return,
                SessionState::Starting => {
                    inner.cancelled = Some(inner.generation);
                    inner.generation += 1;
                    self.set_state(&mut inner, SessionState::Idle);
                    tracing::info!(generation = inner.generation, "start cancelled");
                    StatusEvent::info("start cancelled")
                }
                SessionState::Active | SessionState::Stopping => {
                    inner.generation += 1;
                    match self.release_locked(&mut inner, SessionState::Idle) {
                        Some(event) => event,
                        None => {
                            self.set_state(&mut inner, SessionState::Idle);
                            return;
                        }
                    }
                }
            }
        };
        self.sink.emit(event);
    }

    /// Read the next frame from the bound stream.
    ///
    /// Returns `None` unless the session is `Active`, so readers never touch
    /// a stream that is being torn down. Blocks until the device delivers a
    /// frame; async callers use [`next_frame`](Self::next_frame).
    pub fn read_frame(&self) -> Option<Result<Frame, CameraError>> {
        let mut inner = self.lock();
        if !inner.state.is_active() {
            return None;
        }
        let session = inner.session.as_mut()?;
        Some(session.stream.read_frame())
    }

    /// [`read_frame`](Self::read_frame) on tokio's blocking pool.
    pub async fn next_frame(self: &Arc<Self>) -> Option<Result<Frame, CameraError>> {
        let manager = Arc::clone(self);
        match tokio::task::spawn_blocking(move || manager.read_frame()).await {
            Ok(read) => read,
            Err(err) => Some(Err(CameraError::CaptureFailed(format!(
                "frame read task failed: {err}"
            )))),
        }
    }

    /// Best-effort permission probe. Never fails.
    pub async fn query_permission_state(&self) -> PermissionState {
        if !self.backend.is_supported() {
            return PermissionState::Unsupported;
        }
        self.backend.permission_state().await
    }

    /// Report an asynchronously observed permission change.
    ///
    /// Informational only: a running stream keeps running.
    pub fn permission_changed(&self, state: PermissionState) {
        let session_id = self.lock().session.as_ref().map(|s| s.id);
        tracing::info!(%state, session = ?session_id, "camera permission changed");
        let mut event = StatusEvent::info(format!("camera permission is now {state}"));
        if let Some(id) = session_id {
            event = event.with_session(id);
        }
        self.sink.emit(event);
    }

    async fn acquire(&self, facing: Facing) -> Result<(), CameraError> {
        if !self.backend.is_supported() {
            return Err(self.fail(CameraError::UnsupportedEnvironment));
        }

        let (generation, released) = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.facing = facing;
            let released = self.release_locked(&mut inner, SessionState::Starting);
            self.set_state(&mut inner, SessionState::Starting);
            (inner.generation, released)
        };
        if let Some(event) = released {
            self.sink.emit(event);
        }

        let mut constraints = Constraints::new(facing);
        if let Some((width, height)) = self.frame_size {
            constraints = constraints.with_frame_size(width, height);
        }
        tracing::debug!(%facing, generation, "requesting camera stream");
        let result = self.backend.request_stream(constraints).await;

        let mut inner = self.lock();
        if inner.generation != generation {
            let cancelled = inner.cancelled == Some(generation);
            drop(inner);
            if let Ok(mut stream) = result {
                stream.stop_all_tracks();
                tracing::debug!(
                    generation,
                    device = stream.label(),
                    "released superseded stream"
                );
            }
            // A stop already reported the cancellation.
            if !cancelled {
                self.sink.emit(StatusEvent::error(
                    CameraError::AcquisitionRace.to_string(),
                ));
            }
            return Err(CameraError::AcquisitionRace);
        }

        match result {
            Ok(stream) => {
                let id = Uuid::new_v4();
                let delivered = stream.facing();
                let device = stream.label().to_string();
                inner.session = Some(Session {
                    id,
                    stream,
                    started_at: Instant::now(),
                });
                self.set_state(&mut inner, SessionState::Active);
                drop(inner);

                if delivered != facing {
                    tracing::info!(
                        requested = %facing,
                        %delivered,
                        %device,
                        "substituted nearest available camera"
                    );
                }
                tracing::info!(session = %id, %facing, %device, generation, "camera started");
                self.sink.emit(
                    StatusEvent::info(format!("started {facing} camera ({device})"))
                        .with_session(id),
                );
                Ok(())
            }
            Err(err) => {
                self.set_state(&mut inner, SessionState::Idle);
                drop(inner);
                Err(self.fail(err))
            }
        }
    }

    /// Stop and drop the bound session, leaving the state at `next`.
    ///
    /// Tracks are released under the lock so no observer ever sees two
    /// live streams.
    fn release_locked(
        &self,
        inner: &mut Inner<B::Stream>,
        next: SessionState,
    ) -> Option<StatusEvent> {
        let mut session = inner.session.take()?;
        self.set_state(inner, SessionState::Stopping);
        session.stream.stop_all_tracks();
        self.set_state(inner, next);

        tracing::info!(
            session = %session.id,
            device = session.stream.label(),
            uptime_ms = session.started_at.elapsed().as_millis() as u64,
            "camera stopped"
        );
        Some(StatusEvent::info("stopped").with_session(session.id))
    }

    fn fail(&self, err: CameraError) -> CameraError {
        tracing::warn!(error = %err, "camera request failed");
        self.sink.emit(StatusEvent::error(err.to_string()));
        err
    }

    fn set_state(&self, inner: &mut Inner<B::Stream>, state: SessionState) {
        inner.state = state;
        self.state_tx.send_replace(state);
    }

    fn lock(&self) -> MutexGuard<'_, Inner<B::Stream>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B: CaptureBackend> Drop for SessionManager<B> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut session) = inner.session.take() {
            session.stream.stop_all_tracks();
            tracing::debug!(session = %session.id, "released stream on shutdown");
        }
    }
}
