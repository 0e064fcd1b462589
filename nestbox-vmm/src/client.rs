//! Minimal HTTP client over a Unix domain socket.
//!
//! Firecracker exposes its management API on a Unix socket, not TCP, so we
//! drive hyper's HTTP/1.1 client connection directly over a `UnixStream`.

use std::path::Path;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, Uri};
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;

use crate::error::VmmError;

/// Sends a single HTTP request to a Firecracker API socket and collects the
/// response body.
///
/// `uri_path` is the path component only (e.g. `/boot-source`). Firecracker
/// requires a `Host` header; `localhost` satisfies it.
///
/// # Errors
/// Returns [`VmmError::ApiFailure`] on connect, transport, or non-success
/// status.
pub async fn api_request(
    socket_path: &Path,
    method: Method,
    uri_path: &str,
    body: Option<String>,
) -> Result<String, VmmError> {
    let stream = UnixStream::connect(socket_path).await.map_err(|e| {
        VmmError::ApiFailure(format!("connect to {}: {e}", socket_path.display()))
    })?;
    let io = TokioIo::new(stream);

    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| VmmError::ApiFailure(format!("HTTP handshake: {e}")))?;

    // The connection future must be polled for the request to make progress.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            tracing::debug!(error = %e, "firecracker connection closed");
        }
    });

    let uri: Uri = uri_path
        .parse()
        .map_err(|e| VmmError::ApiFailure(format!("invalid URI path {uri_path}: {e}")))?;

    let body_bytes = body.map(Bytes::from).unwrap_or_default();
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Host", "localhost");
    if !body_bytes.is_empty() {
        builder = builder
            .header("Content-Type", "application/json")
            .header("Content-Length", body_bytes.len().to_string());
    }
    let req = builder
        .body(Full::new(body_bytes))
        .map_err(|e| VmmError::ApiFailure(format!("build request: {e}")))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| VmmError::ApiFailure(format!("send request: {e}")))?;

    let status = resp.status();
    let resp_bytes = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| VmmError::ApiFailure(format!("read response body: {e}")))?
        .to_bytes();
    let resp_body = String::from_utf8_lossy(&resp_bytes).into_owned();

    if !status.is_success() {
        return Err(VmmError::ApiFailure(format!(
            "HTTP {status} from {uri_path}: {resp_body}"
        )));
    }

    Ok(resp_body)
}
