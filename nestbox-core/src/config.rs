//! Desired-configuration snapshot for a microVM.

use serde::{Deserialize, Serialize};

/// Default kernel boot arguments: serial console on ttyS0, no PCI probing.
pub const DEFAULT_BOOT_ARGS: &str = "console=ttyS0 reboot=k panic=1 pci=off";

/// Default number of virtual CPUs.
pub const DEFAULT_VCPUS: u32 = 1;

/// Default guest memory in mebibytes.
pub const DEFAULT_MEMORY_MIB: u32 = 128;

/// Immutable configuration captured when a microVM is created.
///
/// Field names double as the wire format used in status views and create
/// responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroVmConfig {
    /// Number of virtual CPUs.
    pub vcpus: u32,

    /// Guest memory in mebibytes.
    pub memory_mib: u32,

    /// Path to the kernel image inside the Linux VM.
    pub kernel: String,

    /// Path to the root filesystem image inside the Linux VM.
    pub rootfs: String,

    /// Kernel boot argument string.
    pub boot_args: String,
}

impl MicroVmConfig {
    /// Minimal config with default sizing and boot arguments.
    #[must_use]
    pub fn new(kernel: impl Into<String>, rootfs: impl Into<String>) -> Self {
        Self {
            vcpus: DEFAULT_VCPUS,
            memory_mib: DEFAULT_MEMORY_MIB,
            kernel: kernel.into(),
            rootfs: rootfs.into(),
            boot_args: DEFAULT_BOOT_ARGS.to_owned(),
        }
    }
}
