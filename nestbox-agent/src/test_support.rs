//! Shared fixtures for control-plane tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::StatusCode;
use hyper_util::rt::TokioIo;
use nestbox_core::{MicroVmConfig, VmId};
use nestbox_vmm::VmmSettings;
use tokio::net::UnixListener;

use crate::config::AgentConfig;
use crate::microvm::MicroVm;
use crate::routes::{AgentState, SharedState};

/// Agent state wired to a scratch directory: sockets land there, and the
/// "firecracker binary" is the stub script at `fc-stub.sh`, which tests
/// write (or leave missing to provoke spawn failures).
pub(crate) fn test_state(dir: &Path, cap: usize) -> SharedState {
    let config = AgentConfig {
        socket_dir: dir.to_path_buf(),
        legacy_socket_path: dir.join("firecracker.socket"),
        max_microvms: cap,
        vmm: VmmSettings {
            firecracker_bin: dir.join("fc-stub.sh"),
            socket_wait: Duration::from_secs(5),
            stop_grace: Duration::from_secs(2),
            ..VmmSettings::default()
        },
        ..AgentConfig::default()
    };
    Arc::new(AgentState::new(config))
}

/// Writes the executable stub standing in for the firecracker binary; it
/// receives and ignores the real argument list.
pub(crate) fn write_stub_script(dir: &Path, command: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fc-stub.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{command}\n")).expect("write stub script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod stub script");
    path
}

/// Serves a fixed HTTP response on `socket_path`, binding after `delay` so
/// a concurrent spawn has already cleared any stale file there. Answers
/// the readiness probe and proxied requests alike.
pub(crate) fn stub_api_at(
    socket_path: PathBuf,
    delay: Duration,
    status: StatusCode,
    body: &'static str,
) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let listener = match UnixListener::bind(&socket_path) {
            Ok(l) => l,
            Err(e) => panic!("failed to bind stub socket {}: {e}", socket_path.display()),
        };
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let service = service_fn(move |_req: hyper::Request<Incoming>| async move {
                    let resp = hyper::Response::builder()
                        .status(status)
                        .body(Full::new(Bytes::from_static(body.as_bytes())))
                        .expect("stub response");
                    Ok::<_, std::convert::Infallible>(resp)
                });
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });
}

/// Spawns a stub-backed subprocess for a new record, registers it, and
/// returns it in the running state.
pub(crate) async fn running_record(
    state: &SharedState,
    id: &str,
    name: &str,
    status: StatusCode,
    body: &'static str,
) -> Arc<MicroVm> {
    write_stub_script(&state.config.socket_dir, "exec sleep 30");
    let vm_id = VmId::new(id);
    let socket_path = state.config.socket_path_for(&vm_id);
    stub_api_at(socket_path.clone(), Duration::from_millis(200), status, body);

    let vm = MicroVm::new(vm_id, name, socket_path, Some(MicroVmConfig::new("/k", "/r")));
    vm.ensure_started(&state.config.vmm)
        .await
        .expect("stub spawn failed");
    state
        .registry
        .insert(Arc::clone(&vm))
        .expect("register running record");
    vm
}
