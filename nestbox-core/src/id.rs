use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Unique identifier for a microVM record.
///
/// Minted as `vm-<unix-seconds>-<counter>`: stable for the life of the
/// record and never reused while the agent runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VmId(String);

impl VmId {
    /// Creates a `VmId` from any string-like value.
    ///
    /// Intended for parsing client-supplied tokens; fresh identifiers come
    /// from [`VmId::generate`].
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints an identifier from the registry's monotonic counter.
    #[must_use]
    pub fn generate(counter: u64) -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self(format!("vm-{secs}-{counter}"))
    }

    /// The fixed identifier of the legacy singleton record.
    #[must_use]
    pub fn legacy() -> Self {
        Self("legacy".to_owned())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VmId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_embeds_counter() {
        let id = VmId::generate(7);
        assert!(id.as_str().starts_with("vm-"), "id must carry the vm- prefix");
        assert!(id.as_str().ends_with("-7"), "id must end with the counter");
    }

    #[test]
    fn generated_ids_with_distinct_counters_differ() {
        let a = VmId::generate(1);
        let b = VmId::generate(2);
        assert_ne!(a, b, "distinct counters must yield distinct ids");
    }

    #[test]
    fn legacy_id_is_fixed() {
        assert_eq!(VmId::legacy().as_str(), "legacy");
    }
}
