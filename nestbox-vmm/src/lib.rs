//! Firecracker subprocess lifecycle for the nestbox agent.
//!
//! Everything that touches the Firecracker process or its Unix-socket API
//! lives here: spawning and supervision, the configure-then-start boot
//! sequence, the raw HTTP client, and resource sampling.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod boot;
pub mod client;
pub mod error;
pub mod settings;
pub mod stats;
pub mod supervisor;

#[cfg(test)]
mod test_support;

pub use boot::configure_and_start;
pub use error::VmmError;
pub use settings::{VmmSettings, DEFAULT_FIRECRACKER_BIN};
pub use stats::ProcessStats;
pub use supervisor::{ConsoleIn, ConsoleOut, VmProcess};
