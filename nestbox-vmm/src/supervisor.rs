//! Firecracker subprocess supervision.
//!
//! One subprocess per microVM record. The supervisor spawns it bound to a
//! unique API socket, captures stdin/stdout as the serial console, waits
//! for the socket to become connectable, and tears the process down
//! gracefully then forcefully. A background waiter owns the child; the
//! subprocess lifetime is therefore scoped to the record, never to any
//! HTTP request.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixStream;
use tokio::process::{ChildStdin, ChildStdout, Command};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

use crate::error::VmmError;
use crate::settings::VmmSettings;

/// Child log level; suppresses firecracker's per-request chatter.
const CHILD_LOG_LEVEL: &str = "Warning";

/// Poll interval while waiting for the API socket.
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Writable end of the serial console (subprocess stdin).
pub type ConsoleIn = Arc<Mutex<ChildStdin>>;

/// Readable end of the serial console (subprocess stdout).
pub type ConsoleOut = Arc<Mutex<ChildStdout>>;

/// Handle to a live Firecracker subprocess.
///
/// The `Child` itself is owned by the waiter task; this handle carries the
/// pid for signalling, the console pipes, and a watch channel that flips to
/// `false` when the subprocess exits for any reason.
#[derive(Debug, Clone)]
pub struct VmProcess {
    pid: u32,
    stdin: ConsoleIn,
    stdout: ConsoleOut,
    running: watch::Receiver<bool>,
}

impl VmProcess {
    /// OS process id of the subprocess.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the subprocess is still alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Clones the console pipe handles.
    #[must_use]
    pub fn console_pipes(&self) -> (ConsoleIn, ConsoleOut) {
        (Arc::clone(&self.stdin), Arc::clone(&self.stdout))
    }

    /// Resolves once the subprocess has exited for any reason.
    pub async fn exited(&self) {
        let mut rx = self.running.clone();
        let _ = rx.wait_for(|running| !*running).await;
    }

    /// Waits until the subprocess has exited, up to `timeout`.
    ///
    /// Returns `true` if the exit was observed within the timeout.
    pub async fn wait_exited(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.exited()).await.is_ok()
    }
}

/// Spawns a Firecracker subprocess bound to `socket_path` and waits for the
/// socket to accept a trial connection.
///
/// Any stale file at the socket path is removed first. The child's stderr
/// is inherited by the agent; stdin/stdout become the console pipes. The
/// waiter task reaps the child on exit, removes the socket file, and
/// publishes the exit on the watch channel.
///
/// # Errors
/// - [`VmmError::BinaryNotFound`] when the configured binary is absent.
/// - [`VmmError::SpawnFailed`] when the process cannot be started.
/// - [`VmmError::SocketTimeout`] when the socket never becomes connectable;
///   the child is killed before returning.
pub async fn spawn(settings: &VmmSettings, socket_path: &Path) -> Result<VmProcess, VmmError> {
    if !settings.firecracker_bin.exists() {
        return Err(VmmError::BinaryNotFound {
            path: settings.firecracker_bin.clone(),
        });
    }

    let _ = tokio::fs::remove_file(socket_path).await;

    tracing::info!(socket = %socket_path.display(), "spawning firecracker");

    let mut child = Command::new(&settings.firecracker_bin)
        .arg("--api-sock")
        .arg(socket_path)
        .arg("--level")
        .arg(CHILD_LOG_LEVEL)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| {
            VmmError::SpawnFailed(format!(
                "exec {}: {e}",
                settings.firecracker_bin.display()
            ))
        })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| VmmError::SpawnFailed("stdin not piped".to_owned()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| VmmError::SpawnFailed("stdout not piped".to_owned()))?;
    let Some(pid) = child.id() else {
        return Err(VmmError::SpawnFailed("child exited during startup".to_owned()));
    };

    if let Err(e) = wait_for_socket(socket_path, settings.socket_wait).await {
        let _ = child.start_kill();
        let _ = child.wait().await;
        let _ = tokio::fs::remove_file(socket_path).await;
        return Err(e);
    }

    let (running_tx, running_rx) = watch::channel(true);
    let waiter_socket = socket_path.to_path_buf();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) if status.success() => {
                tracing::info!(pid, "firecracker exited cleanly");
            }
            Ok(status) => {
                tracing::error!(pid, %status, "firecracker exited");
            }
            Err(e) => {
                tracing::error!(pid, error = %e, "failed to reap firecracker");
            }
        }
        let _ = tokio::fs::remove_file(&waiter_socket).await;
        let _ = running_tx.send(false);
    });

    tracing::info!(pid, socket = %socket_path.display(), "firecracker ready");

    Ok(VmProcess {
        pid,
        stdin: Arc::new(Mutex::new(stdin)),
        stdout: Arc::new(Mutex::new(stdout)),
        running: running_rx,
    })
}

/// Stops a subprocess and removes its socket file.
///
/// Graceful path: SIGTERM, wait up to the configured grace period, then
/// SIGKILL. With `force` the SIGKILL is immediate. A process that is
/// already gone is not an error.
pub async fn stop(proc: &VmProcess, socket_path: &Path, settings: &VmmSettings, force: bool) {
    if proc.is_running() {
        let pid = proc.pid();
        if force {
            tracing::info!(pid, "killing firecracker");
            send_signal(pid, libc::SIGKILL);
        } else {
            tracing::info!(pid, "stopping firecracker");
            send_signal(pid, libc::SIGTERM);
            if !proc.wait_exited(settings.stop_grace).await {
                tracing::warn!(pid, "graceful stop timed out, killing");
                send_signal(pid, libc::SIGKILL);
            }
        }
        // The waiter reaps promptly once the kill lands.
        let _ = proc.wait_exited(settings.stop_grace).await;
    }
    let _ = tokio::fs::remove_file(socket_path).await;
}

async fn wait_for_socket(socket_path: &Path, timeout: Duration) -> Result<(), VmmError> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if socket_path.exists() {
            if let Ok(conn) = UnixStream::connect(socket_path).await {
                drop(conn);
                return Ok(());
            }
        }
        tokio::time::sleep(SOCKET_POLL_INTERVAL).await;
    }
    Err(VmmError::SocketTimeout {
        path: socket_path.to_path_buf(),
    })
}

#[allow(clippy::cast_possible_wrap)]
fn send_signal(pid: u32, signal: libc::c_int) {
    // SAFETY: kill() on an arbitrary pid is memory-safe; delivery to a
    // process that already exited simply fails with ESRCH.
    unsafe {
        libc::kill(pid as libc::pid_t, signal);
    }
}
