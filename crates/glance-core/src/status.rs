//! Status events and the sinks that receive them.
//!
//! The manager never renders anything itself: it hands every event to a
//! caller-owned [`StatusSink`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Error,
}

/// A timestamped, human-readable lifecycle message.
#[derive(Debug, Clone, Serialize)]
pub struct StatusEvent {
    pub at: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    /// Session the event belongs to, when one is bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
}

impl StatusEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            severity,
            message: message.into(),
            session_id: None,
        }
    }

    pub fn with_session(mut self, id: Uuid) -> Self {
        self.session_id = Some(id);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Info => "info",
            Severity::Error => "error",
        };
        write!(
            f,
            "[{}] {level}: {}",
            self.at.format("%H:%M:%S%.3f"),
            self.message
        )
    }
}

/// Receiver of status events. Implementations must not block.
pub trait StatusSink: Send + Sync {
    fn emit(&self, event: StatusEvent);
}

impl<F> StatusSink for F
where
    F: Fn(StatusEvent) + Send + Sync,
{
    fn emit(&self, event: StatusEvent) {
        self(event)
    }
}

/// Writes status events to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn emit(&self, event: StatusEvent) {
        match event.severity {
            Severity::Info => {
                tracing::info!(session = ?event.session_id, "{}", event.message)
            }
            Severity::Error => {
                tracing::warn!(session = ?event.session_id, "{}", event.message)
            }
        }
    }
}

/// Forwards status events into an unbounded channel for a UI task.
///
/// Events emitted after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusSink for ChannelSink {
    fn emit(&self, event: StatusEvent) {
        let _ = self.tx.send(event);
    }
}
