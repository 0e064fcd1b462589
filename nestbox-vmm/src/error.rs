//! Error types for the lifecycle engine.

use std::path::PathBuf;

/// Errors that can occur while managing a Firecracker subprocess.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum VmmError {
    /// Firecracker binary not found at the configured path.
    #[error("firecracker binary not found at {path}")]
    BinaryNotFound { path: PathBuf },

    /// The subprocess could not be started or died during startup.
    #[error("failed to spawn firecracker: {0}")]
    SpawnFailed(String),

    /// The API socket never became connectable within the configured wait.
    #[error("timeout waiting for firecracker socket at {path}")]
    SocketTimeout { path: PathBuf },

    /// A Firecracker API request failed, at transport level or with a
    /// non-success status.
    #[error("firecracker API request failed: {0}")]
    ApiFailure(String),

    /// Underlying I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
