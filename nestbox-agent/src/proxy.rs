//! Per-microVM reverse proxy to the Firecracker API socket.
//!
//! Requests are relayed verbatim over an HTTP/1.1 client connection dialed
//! on the record's Unix socket; response bodies stream back without
//! buffering, so chunked Firecracker responses relay directly.

use std::path::PathBuf;

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;

use crate::error::AgentError;

/// Reusable HTTP forwarder bound to one microVM's API socket.
///
/// Cheap to clone; held by a record exactly while its subprocess is live.
#[derive(Debug, Clone)]
pub struct VmProxy {
    socket_path: PathBuf,
}

impl VmProxy {
    pub(crate) fn new(socket_path: PathBuf) -> Self {
        Self { socket_path }
    }

    /// Forwards `req` to the socket with its target rewritten to
    /// `path_and_query`, preserving method, headers, and body.
    ///
    /// # Errors
    /// Any dial or transport failure maps to [`AgentError::Upstream`]
    /// (502 to the client).
    pub async fn forward(
        &self,
        req: Request<Body>,
        path_and_query: &str,
    ) -> Result<Response<Body>, AgentError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| upstream(&self.socket_path, "connect", &e))?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| upstream(&self.socket_path, "handshake", &e))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "proxy connection closed");
            }
        });

        let (parts, body) = req.into_parts();
        let mut forwarded = hyper::Request::builder()
            .method(parts.method)
            .uri(path_and_query)
            .body(body)
            .map_err(|e| upstream(&self.socket_path, "build request", &e))?;

        // Firecracker wants a Host header; everything else passes through.
        for (name, value) in &parts.headers {
            if name != header::HOST {
                forwarded.headers_mut().insert(name.clone(), value.clone());
            }
        }
        forwarded
            .headers_mut()
            .insert(header::HOST, HeaderValue::from_static("localhost"));

        let response = sender
            .send_request(forwarded)
            .await
            .map_err(|e| upstream(&self.socket_path, "send request", &e))?;

        let (parts, incoming) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(incoming)))
    }
}

fn upstream(socket: &std::path::Path, stage: &str, err: &dyn std::fmt::Display) -> AgentError {
    AgentError::Upstream(format!("{stage} to {}: {err}", socket.display()))
}
