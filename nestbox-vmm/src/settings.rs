//! Lifecycle tunables.

use std::path::PathBuf;
use std::time::Duration;

/// Default location of the firecracker binary inside the Linux VM.
pub const DEFAULT_FIRECRACKER_BIN: &str = "/usr/local/bin/firecracker";

/// Knobs for subprocess lifecycle management.
///
/// Every timeout that used to be a magic number is configuration here so
/// tests and operators can tighten or relax them.
#[derive(Debug, Clone)]
pub struct VmmSettings {
    /// Path to the firecracker binary.
    pub firecracker_bin: PathBuf,

    /// How long to wait for the API socket to become connectable after
    /// spawning.
    pub socket_wait: Duration,

    /// Grace period between SIGTERM and SIGKILL when stopping.
    pub stop_grace: Duration,

    /// Per-request timeout for boot-sequence API calls.
    pub api_step_timeout: Duration,
}

impl VmmSettings {
    /// Settings for the given binary with default timeouts.
    #[must_use]
    pub fn new(firecracker_bin: impl Into<PathBuf>) -> Self {
        Self {
            firecracker_bin: firecracker_bin.into(),
            socket_wait: Duration::from_secs(30),
            stop_grace: Duration::from_secs(5),
            api_step_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for VmmSettings {
    fn default() -> Self {
        Self::new(DEFAULT_FIRECRACKER_BIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_timeouts() {
        let settings = VmmSettings::default();
        assert_eq!(settings.socket_wait, Duration::from_secs(30));
        assert_eq!(settings.stop_grace, Duration::from_secs(5));
        assert_eq!(settings.api_step_timeout, Duration::from_secs(10));
        assert_eq!(
            settings.firecracker_bin,
            PathBuf::from(DEFAULT_FIRECRACKER_BIN)
        );
    }
}
