//! Camera permission probing via `access(2)` on device nodes.
//!
//! Linux has no consent prompt: access is whatever the node's mode and the
//! caller's groups allow. The probe never opens a device, so it cannot
//! disturb a running stream.

use crate::camera::MAX_VIDEO_NODES;
use crate::devices::FacingOverrides;
use glance_core::PermissionState;
use std::ffi::CString;
use std::io;
use std::path::Path;

/// sysfs class directory present whenever the kernel has V4L2 support.
pub const V4L_SYSFS_DIR: &str = "/sys/class/video4linux";

/// Whether the host exposes V4L2 capture at all.
pub fn v4l_supported() -> bool {
    Path::new(V4L_SYSFS_DIR).is_dir()
}

/// Check read/write access to a device node without opening it.
pub fn check_access(path: &str) -> io::Result<()> {
    let c_path = CString::new(path)?;
    // SAFETY: `c_path` is a valid NUL-terminated string for the duration of the call.
    let ret = unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::W_OK) };
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Existing `/dev/videoN` nodes plus any configured override paths.
pub fn candidate_nodes(overrides: &FacingOverrides) -> Vec<String> {
    let mut nodes: Vec<String> = (0..MAX_VIDEO_NODES)
        .map(|i| format!("/dev/video{i}"))
        .filter(|p| Path::new(p).exists())
        .collect();
    for path in [&overrides.user, &overrides.environment].into_iter().flatten() {
        if !nodes.contains(path) && Path::new(path).exists() {
            nodes.push(path.clone());
        }
    }
    nodes
}

/// Fold per-node access results into a single state.
///
/// Any accessible node means `Granted`. Otherwise a permission error on any
/// node means `Denied`. No nodes, or only unrelated failures, means the
/// answer is not known yet: `Prompt`.
pub fn summarize<I>(results: I) -> PermissionState
where
    I: IntoIterator<Item = io::Result<()>>,
{
    let mut denied = false;
    for result in results {
        match result {
            Ok(()) => return PermissionState::Granted,
            Err(e) if matches!(e.raw_os_error(), Some(libc::EACCES) | Some(libc::EPERM)) => {
                denied = true;
            }
            Err(_) => {}
        }
    }
    if denied {
        PermissionState::Denied
    } else {
        PermissionState::Prompt
    }
}

/// Probe camera permission for the current process.
pub fn probe(overrides: &FacingOverrides) -> PermissionState {
    if !v4l_supported() {
        return PermissionState::Unsupported;
    }
    let nodes = candidate_nodes(overrides);
    let state = summarize(nodes.iter().map(|n| check_access(n)));
    tracing::debug!(nodes = nodes.len(), %state, "probed camera permission");
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_any_granted_wins() {
        let results = vec![
            Err(io::Error::from_raw_os_error(libc::EACCES)),
            Ok(()),
        ];
        assert_eq!(summarize(results), PermissionState::Granted);
    }

    #[test]
    fn test_summarize_denied() {
        let results = vec![
            Err(io::Error::from_raw_os_error(libc::ENOENT)),
            Err(io::Error::from_raw_os_error(libc::EPERM)),
        ];
        assert_eq!(summarize(results), PermissionState::Denied);
    }

    #[test]
    fn test_summarize_nothing_known() {
        assert_eq!(summarize(Vec::new()), PermissionState::Prompt);
        let results = vec![Err(io::Error::from_raw_os_error(libc::ENODEV))];
        assert_eq!(summarize(results), PermissionState::Prompt);
    }

    #[test]
    fn test_check_access_rejects_interior_nul() {
        assert!(check_access("/dev/vid\0eo0").is_err());
    }

    #[test]
    fn test_check_access_missing_path() {
        let err = check_access("/dev/glance-no-such-node").unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }
}
