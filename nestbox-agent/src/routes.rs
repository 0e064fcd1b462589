//! HTTP control plane: routing table and REST handlers.
//!
//! Requests are classified here (health, registry operations, per-VM
//! sub-resources, console, and the opaque passthrough) and fan out to the
//! registry, supervisor, boot sequence, console multiplexer, and proxy.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{any, get, post};
use axum::{Json, Router};
use nestbox_core::{CreateMicroVmRequest, MicroVmInfo, VmId};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::AgentConfig;
use crate::console;
use crate::error::AgentError;
use crate::legacy;
use crate::microvm::MicroVm;
use crate::registry::Registry;

/// Process-wide agent state: configuration plus the record registry.
#[derive(Debug)]
pub struct AgentState {
    pub config: AgentConfig,
    pub registry: Registry,
}

impl AgentState {
    /// Builds the state, sizing the registry from the configured cap.
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        let registry = Registry::new(config.max_microvms);
        Self { config, registry }
    }

    /// Stops every live record. Invoked by the shutdown coordinator after
    /// the listener has drained.
    pub async fn stop_all(&self) {
        for vm in self.registry.list() {
            tracing::info!(vm = %vm.name, "stopping microVM for shutdown");
            vm.shutdown(&self.config.vmm, false).await;
        }
    }
}

/// Shared handle handed to every handler.
pub type SharedState = Arc<AgentState>;

/// Builds the application router.
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/agent/microvms", get(list_microvms).post(create_microvm))
        .route(
            "/agent/microvms/{token}",
            get(microvm_status).delete(delete_microvm),
        )
        .route("/agent/microvms/{token}/console", get(console::attach))
        .route("/agent/microvms/{token}/{*subpath}", any(proxy_subresource))
        .route("/microvms/{token}", any(proxy_root))
        .route("/microvms/{token}/{*subpath}", any(proxy_subresource))
        .route("/agent/start", post(legacy::start))
        .route("/agent/stop", post(legacy::stop))
        .route("/agent/status", get(legacy::status))
        .route("/console", get(legacy::console))
        .fallback(passthrough)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `GET /health`: liveness probe.
async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /agent/microvms`: name-ordered status listing with live resource
/// usage.
async fn list_microvms(State(state): State<SharedState>) -> Json<Vec<MicroVmInfo>> {
    let mut infos = Vec::new();
    for vm in state.registry.list() {
        infos.push(vm.info(true).await);
    }
    Json(infos)
}

/// `POST /agent/microvms`, the create flow: validate, allocate identity,
/// spawn, configure-and-start, then publish in the registry. Any failure
/// after the spawn rolls the subprocess back, so a record becomes visible
/// only fully formed. The work runs on a detached task: a client that
/// disconnects mid-create does not leave Firecracker half-configured.
async fn create_microvm(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<impl IntoResponse, AgentError> {
    let request: CreateMicroVmRequest = serde_json::from_slice(&body)
        .map_err(|e| AgentError::Validation(format!("invalid request body: {e}")))?;
    let (requested_name, config) = request.into_parts()?;

    let task = tokio::spawn(perform_create(Arc::clone(&state), requested_name, config));
    match task.await {
        Ok(result) => result.map(|info| (StatusCode::CREATED, Json(info))),
        Err(e) => Err(AgentError::Internal(format!("create task failed: {e}"))),
    }
}

async fn perform_create(
    state: SharedState,
    requested_name: Option<String>,
    config: nestbox_core::MicroVmConfig,
) -> Result<MicroVmInfo, AgentError> {
    // Advisory capacity check so a doomed create never pays for a spawn;
    // insert below re-checks under the write lock.
    if state.registry.at_capacity() {
        return Err(AgentError::CapacityExceeded(state.config.max_microvms));
    }

    let counter = state.registry.next_counter();
    let id = VmId::generate(counter);
    let name = requested_name.unwrap_or_else(|| format!("microvm-{counter}"));

    // Advisory name check; insert is authoritative.
    if state.registry.name_taken(&name) {
        return Err(AgentError::NameCollision(name));
    }

    let socket_path = state.config.socket_path_for(&id);
    let vm = MicroVm::new(id, name, socket_path, Some(config.clone()));

    vm.ensure_started(&state.config.vmm)
        .await
        .map_err(AgentError::Spawn)?;

    if let Err(e) =
        nestbox_vmm::configure_and_start(&state.config.vmm, &vm.socket_path, &config).await
    {
        vm.shutdown(&state.config.vmm, false).await;
        return Err(AgentError::Configure(e));
    }

    if let Err(e) = state.registry.insert(Arc::clone(&vm)) {
        vm.shutdown(&state.config.vmm, false).await;
        return Err(e.into());
    }

    tracing::info!(vm = %vm.name, id = %vm.id, "created microVM");
    Ok(vm.info(false).await)
}

/// `GET /agent/microvms/{token}`: status of one record, with live CPU and
/// memory when running.
async fn microvm_status(
    State(state): State<SharedState>,
    Path(token): Path<String>,
) -> Result<Json<MicroVmInfo>, AgentError> {
    let vm = resolve_record(&state, &token)?;
    Ok(Json(vm.info(true).await))
}

#[derive(Debug, Default, Deserialize)]
struct DeleteParams {
    #[serde(default)]
    force: bool,
}

/// `DELETE /agent/microvms/{token}[?force=true]`: stop and unregister.
async fn delete_microvm(
    State(state): State<SharedState>,
    Path(token): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<StatusCode, AgentError> {
    let vm = resolve_record(&state, &token)?;
    vm.shutdown(&state.config.vmm, params.force).await;
    state.registry.remove(&vm.id);
    tracing::info!(vm = %vm.name, id = %vm.id, "deleted microVM");
    Ok(StatusCode::NO_CONTENT)
}

/// `<any> /agent/microvms/{token}/{subpath}` and
/// `<any> /microvms/{token}/{subpath}`: opaque forwarding to the record's
/// Firecracker API with the routing prefix stripped.
async fn proxy_subresource(
    State(state): State<SharedState>,
    Path((token, subpath)): Path<(String, String)>,
    req: Request<Body>,
) -> Result<Response<Body>, AgentError> {
    let vm = resolve_record(&state, &token)?;
    let mut target = format!("/{subpath}");
    if let Some(query) = req.uri().query() {
        target.push('?');
        target.push_str(query);
    }
    forward(&vm, req, &target).await
}

/// `<any> /microvms/{token}`: forwards to the Firecracker API root.
async fn proxy_root(
    State(state): State<SharedState>,
    Path(token): Path<String>,
    req: Request<Body>,
) -> Result<Response<Body>, AgentError> {
    let vm = resolve_record(&state, &token)?;
    forward(&vm, req, "/").await
}

/// Fallback for every unrouted path: an `X-MicroVM-ID` header selects a
/// record explicitly; otherwise the request belongs to a legacy client and
/// targets the singleton, spawning it if needed.
async fn passthrough(
    State(state): State<SharedState>,
    req: Request<Body>,
) -> Result<Response<Body>, AgentError> {
    let target = req
        .uri()
        .path_and_query()
        .map_or_else(|| "/".to_owned(), |pq| pq.as_str().to_owned());

    let header_token = req
        .headers()
        .get("x-microvm-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    if let Some(token) = header_token {
        let vm = resolve_record(&state, &token)?;
        return forward(&vm, req, &target).await;
    }

    let vm = legacy::ensure_running(&state).await?;
    forward(&vm, req, &target).await
}

fn resolve_record(state: &SharedState, token: &str) -> Result<Arc<MicroVm>, AgentError> {
    state
        .registry
        .resolve(token)
        .ok_or_else(|| AgentError::NotFound(token.to_owned()))
}

async fn forward(
    vm: &Arc<MicroVm>,
    req: Request<Body>,
    target: &str,
) -> Result<Response<Body>, AgentError> {
    let Some(proxy) = vm.proxy().await else {
        return Err(AgentError::NotRunning("firecracker not running".to_owned()));
    };
    tracing::debug!(vm = %vm.name, %target, "proxying request");
    proxy.forward(req, target).await
}
