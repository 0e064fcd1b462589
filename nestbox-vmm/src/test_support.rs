//! Shared fixtures for lifecycle-engine tests.

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::UnixListener;
use tokio::sync::Mutex;

/// Stand-in for a Firecracker API socket: answers every request with a
/// fixed status and body and records `METHOD path` lines in arrival order.
pub(crate) struct StubApiServer {
    _dir: tempfile::TempDir,
    socket_path: PathBuf,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubApiServer {
    pub(crate) async fn start(status: StatusCode, body: &'static str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket_path = dir.path().join("fc-api.sock");
        let listener = UnixListener::bind(&socket_path).expect("bind stub socket");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let log = Arc::clone(&log);
                        async move {
                            log.lock()
                                .await
                                .push(format!("{} {}", req.method(), req.uri().path()));
                            let resp = Response::builder()
                                .status(status)
                                .body(Full::new(Bytes::from_static(body.as_bytes())))
                                .expect("stub response");
                            Ok::<_, Infallible>(resp)
                        }
                    });
                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });

        Self {
            _dir: dir,
            socket_path,
            requests,
        }
    }

    pub(crate) fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub(crate) async fn requests(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }
}

/// Writes an executable `/bin/sh` script that stands in for the firecracker
/// binary (it receives and ignores the real argument list).
pub(crate) fn write_stub_script(dir: &Path, command: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fc-stub.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{command}\n")).expect("write stub script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod stub script");
    path
}
