use glance_core::{DetectionPoller, Facing};
use glance_hw::FacingOverrides;
use std::time::Duration;

/// CLI configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Facing mode used when a command does not name one.
    pub facing: Facing,
    /// Detection poll cadence.
    pub poll_interval: Duration,
    /// How often the permission monitor re-probes.
    pub permission_poll: Duration,
    /// Preferred capture size passed to the camera.
    pub frame_size: (u32, u32),
    /// Device nodes pinned to a facing mode.
    pub overrides: FacingOverrides,
}

impl Config {
    /// Load configuration from `GLANCE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let facing = lookup("GLANCE_FACING")
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        let poll_ms = parse_or(&lookup, "GLANCE_POLL_INTERVAL_MS", 0u64);
        let poll_interval = if poll_ms == 0 {
            DetectionPoller::DEFAULT_INTERVAL
        } else {
            Duration::from_millis(poll_ms)
        };

        Self {
            facing,
            poll_interval,
            permission_poll: Duration::from_secs(
                parse_or(&lookup, "GLANCE_PERMISSION_POLL_SECS", 5u64).max(1),
            ),
            frame_size: (
                parse_or(&lookup, "GLANCE_FRAME_WIDTH", 640u32),
                parse_or(&lookup, "GLANCE_FRAME_HEIGHT", 480u32),
            ),
            overrides: FacingOverrides {
                user: lookup("GLANCE_USER_CAMERA").filter(|v| !v.is_empty()),
                environment: lookup("GLANCE_ENVIRONMENT_CAMERA").filter(|v| !v.is_empty()),
            },
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]);
        assert_eq!(c.facing, Facing::User);
        assert_eq!(c.poll_interval, Duration::from_millis(100));
        assert_eq!(c.permission_poll, Duration::from_secs(5));
        assert_eq!(c.frame_size, (640, 480));
        assert_eq!(c.overrides, FacingOverrides::default());
    }

    #[test]
    fn test_overrides_from_env() {
        let c = config(&[
            ("GLANCE_FACING", "rear"),
            ("GLANCE_POLL_INTERVAL_MS", "250"),
            ("GLANCE_FRAME_WIDTH", "1280"),
            ("GLANCE_FRAME_HEIGHT", "720"),
            ("GLANCE_ENVIRONMENT_CAMERA", "/dev/video2"),
            ("GLANCE_USER_CAMERA", ""),
        ]);
        assert_eq!(c.facing, Facing::Environment);
        assert_eq!(c.poll_interval, Duration::from_millis(250));
        assert_eq!(c.frame_size, (1280, 720));
        assert_eq!(c.overrides.environment.as_deref(), Some("/dev/video2"));
        assert!(c.overrides.user.is_none());
    }

    #[test]
    fn test_garbage_falls_back_to_defaults() {
        let c = config(&[
            ("GLANCE_FACING", "sideways"),
            ("GLANCE_POLL_INTERVAL_MS", "fast"),
            ("GLANCE_PERMISSION_POLL_SECS", "0"),
        ]);
        assert_eq!(c.facing, Facing::User);
        assert_eq!(c.poll_interval, DetectionPoller::DEFAULT_INTERVAL);
        assert_eq!(c.permission_poll, Duration::from_secs(1));
    }
}
