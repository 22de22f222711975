//! glance-hw: Linux capture backend for the session manager.
//!
//! Provides V4L2 camera access, maps devices to facing modes, and probes
//! device-node permissions.

pub mod backend;
pub mod camera;
pub mod devices;
pub mod permission;

pub use backend::{V4lBackend, V4lStream};
pub use camera::{Camera, DeviceError, DeviceInfo, LiveCapture, PixelFormat};
pub use devices::{FacingOverrides, ResolvedDevice};
