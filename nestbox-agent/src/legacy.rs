//! Backwards-compatible single-VM endpoints.
//!
//! Clients predating the registry address one implicit record with id
//! `legacy` and name `default`. The adapter is a thin translation layer:
//! the record is a normal registry entry (cap-exempt) created lazily on
//! first touch, and it delegates to the same supervisor, boot sequence,
//! and console multiplexer as everything else. Allocation is lazy but
//! spawning is not: only start-shaped paths bring the subprocess up, so
//! status polling can never restart a stopped VM.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, Response};
use axum::Json;
use nestbox_core::VmId;
use serde_json::{json, Value};

use crate::error::AgentError;
use crate::microvm::MicroVm;
use crate::routes::SharedState;

/// Returns the legacy singleton record, inserting it on first touch.
pub(crate) fn ensure_record(state: &SharedState) -> Arc<MicroVm> {
    if let Some(vm) = state.registry.resolve(VmId::legacy().as_str()) {
        return vm;
    }
    let vm = MicroVm::new(
        VmId::legacy(),
        "default",
        state.config.legacy_socket_path.clone(),
        None,
    );
    match state.registry.insert(Arc::clone(&vm)) {
        Ok(()) => vm,
        // Lost a first-touch race, or a client VM holds the name "default";
        // prefer whatever the registry has.
        Err(_) => state
            .registry
            .resolve(VmId::legacy().as_str())
            .unwrap_or(vm),
    }
}

/// Ensures the legacy record exists and its subprocess is running.
///
/// The un-prefixed passthrough is how legacy clients configure Firecracker
/// directly, so it is ensure-running shaped.
///
/// # Errors
/// Propagates spawn failures as [`AgentError::Spawn`].
pub(crate) async fn ensure_running(state: &SharedState) -> Result<Arc<MicroVm>, AgentError> {
    let vm = ensure_record(state);
    vm.ensure_started(&state.config.vmm)
        .await
        .map_err(AgentError::Spawn)?;
    Ok(vm)
}

/// `POST /agent/start`.
pub async fn start(State(state): State<SharedState>) -> Result<Json<Value>, AgentError> {
    let vm = ensure_record(&state);
    if vm.is_running().await {
        return Ok(Json(json!({
            "status": "already_running",
            "pid": vm.pid().await,
        })));
    }
    vm.ensure_started(&state.config.vmm)
        .await
        .map_err(AgentError::Spawn)?;
    tracing::info!(vm = %vm.name, "legacy microVM started");
    Ok(Json(json!({ "status": "started", "pid": vm.pid().await })))
}

/// `POST /agent/stop`.
pub async fn stop(State(state): State<SharedState>) -> Json<Value> {
    if let Some(vm) = state.registry.resolve(VmId::legacy().as_str()) {
        if vm.is_running().await {
            vm.shutdown(&state.config.vmm, false).await;
            tracing::info!(vm = %vm.name, "legacy microVM stopped");
            return Json(json!({ "status": "stopped" }));
        }
    }
    Json(json!({ "status": "not_running" }))
}

/// `GET /agent/status`: read-only; never allocates or spawns.
pub async fn status(State(state): State<SharedState>) -> Json<Value> {
    let socket_path = state.config.legacy_socket_path.display().to_string();
    match state.registry.resolve(VmId::legacy().as_str()) {
        Some(vm) => {
            let mut status = json!({
                "firecracker_running": vm.is_running().await,
                "socket_path": socket_path,
            });
            if let Some(pid) = vm.pid().await {
                status["pid"] = json!(pid);
            }
            Json(status)
        }
        None => Json(json!({
            "firecracker_running": false,
            "socket_path": socket_path,
        })),
    }
}

/// `GET /console`: console of the legacy record; 503 when not running.
pub async fn console(
    State(state): State<SharedState>,
    req: Request<Body>,
) -> Result<Response<Body>, AgentError> {
    let vm = ensure_record(&state);
    crate::console::attach_record(&vm, req).await
}
