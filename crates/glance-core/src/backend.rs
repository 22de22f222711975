//! Hardware collaborator boundary.

use crate::error::CameraError;
use crate::frame::Frame;
use crate::types::{Constraints, Facing, PermissionState};
use std::future::Future;

/// An acquired capture stream and the hardware tracks behind it.
pub trait StreamHandle: Send + 'static {
    /// Facing mode of the camera actually opened. May differ from the
    /// request when the backend substituted the nearest available device.
    fn facing(&self) -> Facing;

    /// Human-readable device label (path, card name).
    fn label(&self) -> &str;

    /// Read the next frame. Fails once the tracks have been stopped.
    fn read_frame(&mut self) -> Result<Frame, CameraError>;

    /// Release every underlying track so the device is closed and unlocked.
    /// Calling it again is a no-op.
    fn stop_all_tracks(&mut self);
}

/// Host media-capture capability.
pub trait CaptureBackend: Send + Sync + 'static {
    type Stream: StreamHandle;

    /// Whether the host exposes any capture capability at all.
    fn is_supported(&self) -> bool;

    /// Acquire a stream under the given constraints.
    fn request_stream(
        &self,
        constraints: Constraints,
    ) -> impl Future<Output = Result<Self::Stream, CameraError>> + Send;

    /// Best-effort permission probe; must not block on the device.
    fn permission_state(&self) -> impl Future<Output = PermissionState> + Send;
}
