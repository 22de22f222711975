use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Which way the requested camera points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    /// Front camera, pointing at the person using the device.
    #[default]
    User,
    /// Rear camera, pointing away from the user.
    Environment,
}

impl Facing {
    pub fn opposite(self) -> Self {
        match self {
            Facing::User => Facing::Environment,
            Facing::Environment => Facing::User,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Facing::User => "user",
            Facing::Environment => "environment",
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown facing mode: {0} (expected user or environment)")]
pub struct ParseFacingError(String);

impl FromStr for Facing {
    type Err = ParseFacingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" | "front" => Ok(Facing::User),
            "environment" | "rear" | "back" => Ok(Facing::Environment),
            other => Err(ParseFacingError(other.to_string())),
        }
    }
}

/// Capture parameters for a single start attempt.
///
/// Every field is a preference; backends may substitute the closest
/// device or format they have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constraints {
    pub facing: Facing,
    /// Preferred (width, height) in pixels.
    pub frame_size: Option<(u32, u32)>,
}

impl Constraints {
    pub fn new(facing: Facing) -> Self {
        Self {
            facing,
            frame_size: None,
        }
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = Some((width, height));
        self
    }
}

/// Lifecycle state of the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        self == SessionState::Active
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Active => "active",
            SessionState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Result of a best-effort camera permission probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Granted,
    Denied,
    /// Not yet decided; the next start attempt will find out.
    Prompt,
    /// The host has no way to answer the question.
    Unsupported,
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
            PermissionState::Prompt => "prompt",
            PermissionState::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

/// Point-in-time snapshot of the manager, suitable for display or JSON.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Facing mode of the most recent request.
    pub facing: Facing,
    /// Set only while a stream is bound.
    pub session_id: Option<Uuid>,
    /// Device label reported by the backend for the bound stream.
    pub device: Option<String>,
    pub active_for_ms: Option<u64>,
}
