//! Facing-mode database and device selection.
//!
//! V4L2 has no notion of which way a camera points, so facing is decided
//! from, in order: explicit per-facing overrides, an embedded database
//! keyed by USB VID:PID (`contrib/cameras/*.toml`), and node order (first
//! camera faces the user, the rest face the environment). When nothing
//! matches, the first camera is substituted.

use crate::camera::DeviceInfo;
use glance_core::Facing;
use serde::Deserialize;
use std::sync::OnceLock;

const CAMERA_04F2_B6D9: &str = include_str!("../../../contrib/cameras/04f2-b6d9.toml");
const CAMERA_046D_0825: &str = include_str!("../../../contrib/cameras/046d-0825.toml");

static CAMERA_DB: OnceLock<Vec<CameraEntry>> = OnceLock::new();

/// One `contrib/cameras/*.toml` file.
#[derive(Debug, Clone, Deserialize)]
pub struct CameraEntry {
    pub facing: Facing,
    pub device: UsbDevice,
}

/// Camera identification fields from the `[device]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct UsbDevice {
    pub vendor_id: u16,
    pub product_id: u16,
    pub name: String,
}

fn camera_db() -> &'static Vec<CameraEntry> {
    CAMERA_DB.get_or_init(|| {
        let mut db = Vec::new();
        for src in [CAMERA_04F2_B6D9, CAMERA_046D_0825] {
            match toml::from_str::<CameraEntry>(src) {
                Ok(entry) => db.push(entry),
                Err(e) => tracing::warn!(error = %e, "bad camera database entry"),
            }
        }
        db
    })
}

/// Look up a known camera by USB vendor:product ID.
pub fn lookup_camera(vid: u16, pid: u16) -> Option<&'static CameraEntry> {
    camera_db()
        .iter()
        .find(|c| c.device.vendor_id == vid && c.device.product_id == pid)
}

/// Read USB VID:PID from sysfs for a `/dev/videoN` device.
///
/// Returns `None` if the device is not USB or sysfs is unavailable.
pub fn get_usb_ids(device_path: &str) -> Option<(u16, u16)> {
    // /dev/video2 → "video2"
    let dev_name = std::path::Path::new(device_path).file_name()?.to_str()?;
    // /sys/class/video4linux/video2/device links to the USB interface dir
    let device_link = format!("/sys/class/video4linux/{dev_name}/device");
    let interface_dir = std::fs::canonicalize(&device_link).ok()?;
    let usb_device_dir = interface_dir.parent()?;

    let vid_str = std::fs::read_to_string(usb_device_dir.join("idVendor")).ok()?;
    let pid_str = std::fs::read_to_string(usb_device_dir.join("idProduct")).ok()?;

    let vid = u16::from_str_radix(vid_str.trim(), 16).ok()?;
    let pid = u16::from_str_radix(pid_str.trim(), 16).ok()?;
    Some((vid, pid))
}

/// Device paths pinned to a facing mode by configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacingOverrides {
    pub user: Option<String>,
    pub environment: Option<String>,
}

impl FacingOverrides {
    pub fn get(&self, facing: Facing) -> Option<&str> {
        match facing {
            Facing::User => self.user.as_deref(),
            Facing::Environment => self.environment.as_deref(),
        }
    }

    fn pinned_facing(&self, path: &str) -> Option<Facing> {
        if self.user.as_deref() == Some(path) {
            Some(Facing::User)
        } else if self.environment.as_deref() == Some(path) {
            Some(Facing::Environment)
        } else {
            None
        }
    }
}

/// The device chosen for a request and the way it actually faces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDevice {
    pub path: String,
    pub facing: Facing,
    pub name: String,
}

/// Best-known facing of each device, in node order.
pub fn classify(devices: &[DeviceInfo], overrides: &FacingOverrides) -> Vec<Facing> {
    devices
        .iter()
        .enumerate()
        .map(|(index, dev)| {
            overrides
                .pinned_facing(&dev.path)
                .or_else(|| {
                    dev.usb_ids
                        .and_then(|(vid, pid)| lookup_camera(vid, pid))
                        .map(|entry| entry.facing)
                })
                .unwrap_or(if index == 0 {
                    Facing::User
                } else {
                    Facing::Environment
                })
        })
        .collect()
}

/// Pick the device for `facing`, substituting the first camera when no
/// device faces the requested way. `None` only when there are no devices
/// and no override.
pub fn resolve(
    devices: &[DeviceInfo],
    facing: Facing,
    overrides: &FacingOverrides,
) -> Option<ResolvedDevice> {
    if let Some(path) = overrides.get(facing) {
        let name = devices
            .iter()
            .find(|d| d.path == path)
            .map(|d| d.name.clone())
            .unwrap_or_else(|| path.to_string());
        return Some(ResolvedDevice {
            path: path.to_string(),
            facing,
            name,
        });
    }

    let facings = classify(devices, overrides);
    let index = facings
        .iter()
        .position(|&f| f == facing)
        .or(if devices.is_empty() { None } else { Some(0) })?;

    let dev = &devices[index];
    if facings[index] != facing {
        tracing::debug!(
            requested = %facing,
            device = %dev.path,
            "no matching camera; substituting"
        );
    }
    Some(ResolvedDevice {
        path: dev.path.clone(),
        facing: facings[index],
        name: dev.name.clone(),
    })
}
