//! Background permission watcher.
//!
//! Hosts rarely push permission changes, so the monitor re-probes on an
//! interval and reports transitions through
//! [`SessionManager::permission_changed`]. A change never stops a running
//! stream.

use crate::backend::CaptureBackend;
use crate::session::SessionManager;
use crate::types::PermissionState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct PermissionMonitor {
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PermissionMonitor {
    /// Probe once immediately, then every `every`, reporting changes.
    pub fn spawn<B: CaptureBackend>(manager: Arc<SessionManager<B>>, every: Duration) -> Self {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last: Option<PermissionState> = None;

            loop {
                tokio::select! {
                    res = cancel_rx.changed() => {
                        if res.is_err() || *cancel_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let state = manager.query_permission_state().await;
                        match last {
                            None => tracing::debug!(%state, "initial camera permission"),
                            Some(prev) if prev != state => manager.permission_changed(state),
                            Some(_) => {}
                        }
                        last = Some(state);
                    }
                }
            }
        });
        Self { cancel_tx, task }
    }

    pub async fn shutdown(self) {
        let _ = self.cancel_tx.send(true);
        if let Err(err) = self.task.await {
            tracing::warn!(error = %err, "permission monitor task failed");
        }
    }
}
