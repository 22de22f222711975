//! glance-core: Camera session lifecycle.
//!
//! Owns at most one live capture stream, arbitrates start/stop/switch
//! requests with a generation counter, and reports progress as status
//! events. Hardware access goes through the [`CaptureBackend`] trait so the
//! state machine runs unchanged against V4L2 or a test double.

pub mod backend;
pub mod error;
pub mod frame;
pub mod permission;
pub mod poller;
pub mod session;
pub mod status;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use backend::{CaptureBackend, StreamHandle};
pub use error::CameraError;
pub use frame::Frame;
pub use permission::PermissionMonitor;
pub use poller::{DetectionPoller, FrameConsumer, PollStats, PollerHandle};
pub use session::SessionManager;
pub use status::{ChannelSink, Severity, StatusEvent, StatusSink, TracingSink};
pub use types::{Constraints, Facing, PermissionState, SessionState, SessionStatus};
