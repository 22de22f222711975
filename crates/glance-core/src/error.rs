use thiserror::Error;

/// Errors surfaced by session lifecycle operations and capture backends.
///
/// None of these are fatal: the manager reports each one as an error status
/// and stays usable, so retrying is just another `start`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera access denied: {0}")]
    PermissionDenied(String),
    #[error("no camera available: {0}")]
    DeviceUnavailable(String),
    #[error("this host exposes no media capture capability")]
    UnsupportedEnvironment,
    #[error("camera request superseded by a newer request")]
    AcquisitionRace,
    /// Frame reads only; lifecycle operations never return this.
    #[error("frame capture failed: {0}")]
    CaptureFailed(String),
}
