//! Core types for the nestbox microVM agent.
//!
//! Defines the domain vocabulary shared by the lifecycle engine and the
//! HTTP control plane: identifiers, configuration snapshots, create-request
//! validation, and the status wire format.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod error;
pub mod id;
pub mod request;
pub mod status;

pub use config::{MicroVmConfig, DEFAULT_BOOT_ARGS, DEFAULT_MEMORY_MIB, DEFAULT_VCPUS};
pub use error::CoreError;
pub use id::VmId;
pub use request::CreateMicroVmRequest;
pub use status::MicroVmInfo;
