//! Boot-sequence orchestration against a freshly spawned Firecracker.
//!
//! Firecracker rejects configuration applied out of order, and
//! `InstanceStart` must come last. Each step is a `PUT` over the record's
//! own API socket with its own bounded timeout; a failure at any step fails
//! the whole sequence and leaves rollback to the caller.

use std::path::Path;

use hyper::Method;
use nestbox_core::MicroVmConfig;

use crate::client::api_request;
use crate::error::VmmError;
use crate::settings::VmmSettings;

/// Drives the configure-then-start sequence for a spawned microVM:
/// boot source, root drive, machine config, `InstanceStart`.
///
/// # Errors
/// Returns [`VmmError::ApiFailure`] when any step times out, fails at
/// transport level, or is rejected by Firecracker.
pub async fn configure_and_start(
    settings: &VmmSettings,
    socket_path: &Path,
    config: &MicroVmConfig,
) -> Result<(), VmmError> {
    let boot_source = serde_json::json!({
        "kernel_image_path": config.kernel,
        "boot_args": config.boot_args,
    });
    put(settings, socket_path, "/boot-source", &boot_source).await?;

    let root_drive = serde_json::json!({
        "drive_id": "rootfs",
        "path_on_host": config.rootfs,
        "is_root_device": true,
        "is_read_only": false,
    });
    put(settings, socket_path, "/drives/rootfs", &root_drive).await?;

    let machine = serde_json::json!({
        "vcpu_count": config.vcpus,
        "mem_size_mib": config.memory_mib,
    });
    put(settings, socket_path, "/machine-config", &machine).await?;

    let start = serde_json::json!({ "action_type": "InstanceStart" });
    put(settings, socket_path, "/actions", &start).await?;

    Ok(())
}

async fn put(
    settings: &VmmSettings,
    socket_path: &Path,
    uri_path: &str,
    body: &serde_json::Value,
) -> Result<(), VmmError> {
    let request = api_request(socket_path, Method::PUT, uri_path, Some(body.to_string()));
    match tokio::time::timeout(settings.api_step_timeout, request).await {
        Ok(result) => result.map(|_| ()),
        Err(_) => Err(VmmError::ApiFailure(format!(
            "{uri_path}: no response within {:?}",
            settings.api_step_timeout
        ))),
    }
}
