//! [`CaptureBackend`] over V4L2.

use crate::camera::{Camera, DeviceError, DeviceInfo, LiveCapture};
use crate::devices::{self, FacingOverrides};
use crate::permission;
use glance_core::{CameraError, CaptureBackend, Constraints, Facing, Frame, PermissionState, StreamHandle};
use std::future::Future;

/// Linux capture backend. Blocking device calls run on tokio's blocking pool.
#[derive(Debug, Clone, Default)]
pub struct V4lBackend {
    overrides: FacingOverrides,
}

impl V4lBackend {
    pub fn new(overrides: FacingOverrides) -> Self {
        Self { overrides }
    }

    /// Discovered capture devices with their resolved facing mode.
    pub fn devices(&self) -> Vec<(DeviceInfo, Facing)> {
        let devices = Camera::list_devices();
        let facings = devices::classify(&devices, &self.overrides);
        devices.into_iter().zip(facings).collect()
    }
}

impl CaptureBackend for V4lBackend {
    type Stream = V4lStream;

    fn is_supported(&self) -> bool {
        permission::v4l_supported()
    }

    fn request_stream(
        &self,
        constraints: Constraints,
    ) -> impl Future<Output = Result<V4lStream, CameraError>> + Send {
        let overrides = self.overrides.clone();
        async move {
            tokio::task::spawn_blocking(move || open_stream(&overrides, constraints))
                .await
                .map_err(|e| CameraError::DeviceUnavailable(format!("camera open task failed: {e}")))?
        }
    }

    fn permission_state(&self) -> impl Future<Output = PermissionState> + Send {
        let overrides = self.overrides.clone();
        async move {
            tokio::task::spawn_blocking(move || permission::probe(&overrides))
                .await
                .unwrap_or(PermissionState::Unsupported)
        }
    }
}

fn open_stream(overrides: &FacingOverrides, constraints: Constraints) -> Result<V4lStream, CameraError> {
    let devices = Camera::list_devices();
    let Some(target) = devices::resolve(&devices, constraints.facing, overrides) else {
        // Nodes that exist but could not be listed are usually unreadable.
        if permission::probe(overrides) == PermissionState::Denied {
            return Err(CameraError::PermissionDenied(
                "no accessible video device (check membership of the video group)".into(),
            ));
        }
        return Err(CameraError::DeviceUnavailable(format!(
            "no {} camera found",
            constraints.facing
        )));
    };

    let camera = Camera::open(&target.path, constraints.frame_size)?;
    let capture = LiveCapture::start(camera)?;
    let label = format!("{} ({})", target.name, target.path);
    tracing::debug!(device = %label, facing = %target.facing, "stream acquired");
    Ok(V4lStream::new(capture, target.facing, label))
}

/// Where a [`V4lStream`] gets its frames from.
pub trait FrameSource: Send + 'static {
    fn next_frame(&mut self) -> Result<Frame, DeviceError>;
}

impl FrameSource for LiveCapture {
    fn next_frame(&mut self) -> Result<Frame, DeviceError> {
        LiveCapture::next_frame(self)
    }
}

/// An open camera. The capture stream lives as long as the handle;
/// stopping it ends streaming and closes the device node.
pub struct V4lStream<S: FrameSource = LiveCapture> {
    source: Option<S>,
    facing: Facing,
    label: String,
}

impl<S: FrameSource> V4lStream<S> {
    fn new(source: S, facing: Facing, label: String) -> Self {
        Self {
            source: Some(source),
            facing,
            label,
        }
    }
}

impl<S: FrameSource> StreamHandle for V4lStream<S> {
    fn facing(&self) -> Facing {
        self.facing
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn read_frame(&mut self) -> Result<Frame, CameraError> {
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| CameraError::CaptureFailed("stream stopped".into()))?;
        Ok(source.next_frame()?)
    }

    fn stop_all_tracks(&mut self) {
        if let Some(source) = self.source.take() {
            drop(source);
            tracing::debug!(device = %self.label, "camera closed");
        }
    }
}
