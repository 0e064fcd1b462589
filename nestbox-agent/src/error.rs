//! Control-plane error taxonomy and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use nestbox_vmm::VmmError;
use serde_json::json;

use crate::registry::RegistryError;

/// Errors surfaced to HTTP clients of the agent.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AgentError {
    /// Malformed request body or missing required field.
    #[error("{0}")]
    Validation(String),

    /// Unknown microVM token.
    #[error("microVM not found: {0}")]
    NotFound(String),

    /// Another live record already uses the requested name.
    #[error("microVM with name '{0}' already exists")]
    NameCollision(String),

    /// Creating the record would exceed the instance cap.
    #[error("maximum microVM limit reached ({0})")]
    CapacityExceeded(usize),

    /// The subprocess could not be spawned or never became ready.
    #[error("failed to start firecracker: {0}")]
    Spawn(#[source] VmmError),

    /// The boot sequence failed; the spawn has been rolled back.
    #[error("failed to configure microVM: {0}")]
    Configure(#[source] VmmError),

    /// Forwarding to the Firecracker socket failed.
    #[error("proxy error: {0}")]
    Upstream(String),

    /// The operation requires a running subprocess.
    #[error("{0}")]
    NotRunning(String),

    /// The console pipes are already held by another client.
    #[error("console already attached")]
    ConsoleBusy,

    /// Unexpected internal condition.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
    fn status(&self) -> StatusCode {
        match self {
            AgentError::Validation(_) => StatusCode::BAD_REQUEST,
            AgentError::NotFound(_) => StatusCode::NOT_FOUND,
            AgentError::NameCollision(_) => StatusCode::CONFLICT,
            AgentError::CapacityExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            AgentError::Spawn(_) | AgentError::Configure(_) | AgentError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AgentError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AgentError::NotRunning(_) | AgentError::ConsoleBusy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(%status, error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<nestbox_core::CoreError> for AgentError {
    fn from(err: nestbox_core::CoreError) -> Self {
        AgentError::Validation(err.to_string())
    }
}

impl From<RegistryError> for AgentError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NameTaken(name) => AgentError::NameCollision(name),
            RegistryError::CapacityExceeded(cap) => AgentError::CapacityExceeded(cap),
        }
    }
}
