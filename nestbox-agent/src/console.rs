//! Interactive serial console over a hijacked HTTP connection.
//!
//! The endpoint takes the client connection over via HTTP upgrade and
//! bridges raw bytes between it and the subprocess stdin/stdout pipes.
//! There is no framing and no line discipline; either side closing tears
//! the whole bridge down.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::AgentError;
use crate::microvm::MicroVm;
use crate::routes::SharedState;

/// Copy-loop buffer size. Small keeps keystroke echo latency low.
const CONSOLE_BUF: usize = 1024;

/// `GET /agent/microvms/{token}/console`.
pub async fn attach(
    State(state): State<SharedState>,
    Path(token): Path<String>,
    req: Request<Body>,
) -> Result<Response<Body>, AgentError> {
    let vm = state
        .registry
        .resolve(&token)
        .ok_or(AgentError::NotFound(token))?;
    attach_record(&vm, req).await
}

/// Takes over the client connection and bridges it to the record's console
/// pipes. Shared by the multi-VM and legacy endpoints.
pub(crate) async fn attach_record(
    vm: &Arc<MicroVm>,
    req: Request<Body>,
) -> Result<Response<Body>, AgentError> {
    let Some((stdin, stdout)) = vm.console_pipes().await else {
        return Err(AgentError::NotRunning("microVM not running".to_owned()));
    };

    // Claim both pipes before answering; a second concurrent console gets
    // turned away instead of interleaving reads with the first.
    let Ok(stdin) = Arc::clone(&stdin).try_lock_owned() else {
        return Err(AgentError::ConsoleBusy);
    };
    let Ok(stdout) = Arc::clone(&stdout).try_lock_owned() else {
        return Err(AgentError::ConsoleBusy);
    };

    let name = vm.name.clone();
    let on_upgrade = hyper::upgrade::on(req);
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                tracing::info!(vm = %name, "console attached");
                let (mut stdin, mut stdout) = (stdin, stdout);
                bridge(TokioIo::new(upgraded), &mut *stdin, &mut *stdout).await;
                tracing::info!(vm = %name, "console detached");
            }
            Err(e) => {
                tracing::debug!(vm = %name, error = %e, "console upgrade failed");
            }
        }
    });

    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::CONNECTION, "Upgrade")
        .header(header::UPGRADE, "raw")
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::empty())
        .map_err(|e| AgentError::Internal(e.to_string()))
}

/// Pumps bytes in both directions with two copy loops racing under
/// `select!`. Whichever loop finishes first wins; dropping the halves on
/// return closes the hijacked connection, which breaks the other loop on
/// its next I/O.
async fn bridge<C, W, R>(client: C, vm_in: &mut W, vm_out: &mut R)
where
    C: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    let (mut client_rd, mut client_wr) = tokio::io::split(client);

    let to_client = async {
        let mut buf = [0u8; CONSOLE_BUF];
        loop {
            let n = match vm_out.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            if client_wr.write_all(&buf[..n]).await.is_err() {
                break;
            }
            if client_wr.flush().await.is_err() {
                break;
            }
        }
    };

    let to_vm = async {
        let mut buf = [0u8; CONSOLE_BUF];
        loop {
            let n = match client_rd.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            if vm_in.write_all(&buf[..n]).await.is_err() {
                break;
            }
            if vm_in.flush().await.is_err() {
                break;
            }
        }
    };

    tokio::select! {
        () = to_client => {}
        () = to_vm => {}
    }
}
