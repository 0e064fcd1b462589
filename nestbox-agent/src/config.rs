//! Agent configuration.
//!
//! Entirely process-scoped: read once from `NESTBOX_*` environment
//! variables at startup, nothing persisted.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use nestbox_core::VmId;
use nestbox_vmm::VmmSettings;

/// Default HTTP port inside the Linux VM.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default cap on concurrently live microVMs.
pub const DEFAULT_MAX_MICROVMS: usize = 10;

/// Runtime configuration for the agent process.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// TCP listen address, all interfaces by default.
    pub listen_addr: SocketAddr,

    /// Directory where per-VM API sockets are created.
    pub socket_dir: PathBuf,

    /// API socket path of the legacy singleton record.
    pub legacy_socket_path: PathBuf,

    /// Maximum number of concurrently live microVMs.
    pub max_microvms: usize,

    /// Subprocess lifecycle tunables (binary path and timeouts).
    pub vmm: VmmSettings,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_HTTP_PORT)),
            socket_dir: PathBuf::from("/tmp"),
            legacy_socket_path: PathBuf::from("/tmp/firecracker.socket"),
            max_microvms: DEFAULT_MAX_MICROVMS,
            vmm: VmmSettings::default(),
        }
    }
}

impl AgentConfig {
    /// Builds the configuration from `NESTBOX_*` environment variables,
    /// keeping defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(port) = env_parsed::<u16>("NESTBOX_HTTP_PORT") {
            config.listen_addr.set_port(port);
        }
        if let Ok(bin) = std::env::var("NESTBOX_FIRECRACKER_BIN") {
            config.vmm.firecracker_bin = PathBuf::from(bin);
        }
        if let Ok(dir) = std::env::var("NESTBOX_SOCKET_DIR") {
            config.socket_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("NESTBOX_LEGACY_SOCKET") {
            config.legacy_socket_path = PathBuf::from(path);
        }
        if let Some(max) = env_parsed::<usize>("NESTBOX_MAX_MICROVMS") {
            config.max_microvms = max;
        }
        config
    }

    /// Derives the API socket path for a record identifier.
    #[must_use]
    pub fn socket_path_for(&self, id: &VmId) -> PathBuf {
        self.socket_dir.join(format!("firecracker-{id}.socket"))
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
