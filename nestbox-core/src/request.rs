//! Create-request body parsing and validation.

use serde::Deserialize;

use crate::config::{MicroVmConfig, DEFAULT_BOOT_ARGS, DEFAULT_MEMORY_MIB, DEFAULT_VCPUS};
use crate::error::CoreError;

/// Body of `POST /agent/microvms`.
///
/// Every field is optional at the serde level so that a missing `kernel` or
/// `rootfs` surfaces as a validation error rather than a parse error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateMicroVmRequest {
    /// Human-friendly label; auto-generated when absent.
    #[serde(default)]
    pub name: Option<String>,

    /// Path to the kernel image. Required.
    #[serde(default)]
    pub kernel: Option<String>,

    /// Path to the root filesystem image. Required.
    #[serde(default)]
    pub rootfs: Option<String>,

    /// Number of virtual CPUs; zero or absent means the default.
    #[serde(default)]
    pub vcpus: Option<u32>,

    /// Guest memory in mebibytes; zero or absent means the default.
    #[serde(default)]
    pub memory_mib: Option<u32>,

    /// Kernel boot arguments; empty or absent means the default.
    #[serde(default)]
    pub boot_args: Option<String>,
}

impl CreateMicroVmRequest {
    /// Validates the request and applies defaults.
    ///
    /// Returns the client-requested name (if any) and the immutable config
    /// snapshot for the new record.
    ///
    /// # Errors
    /// Returns [`CoreError::MissingField`] when `kernel` or `rootfs` is
    /// absent or empty.
    pub fn into_parts(self) -> Result<(Option<String>, MicroVmConfig), CoreError> {
        let kernel = self
            .kernel
            .filter(|k| !k.is_empty())
            .ok_or(CoreError::MissingField { field: "kernel" })?;
        let rootfs = self
            .rootfs
            .filter(|r| !r.is_empty())
            .ok_or(CoreError::MissingField { field: "rootfs" })?;

        let config = MicroVmConfig {
            vcpus: self.vcpus.filter(|v| *v != 0).unwrap_or(DEFAULT_VCPUS),
            memory_mib: self
                .memory_mib
                .filter(|m| *m != 0)
                .unwrap_or(DEFAULT_MEMORY_MIB),
            kernel,
            rootfs,
            boot_args: self
                .boot_args
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| DEFAULT_BOOT_ARGS.to_owned()),
        };

        let name = self.name.filter(|n| !n.is_empty());
        Ok((name, config))
    }
}
