//! Wire-level status view of a microVM.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MicroVmConfig;
use crate::id::VmId;

/// Status record returned by the list and per-VM GET endpoints.
///
/// `pid`, `cpu_percent`, and `memory_used_mb` are omitted from the wire when
/// unknown; `config` is `null` for records created without one (the legacy
/// singleton).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicroVmInfo {
    pub id: VmId,
    pub name: String,
    pub running: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub config: Option<MicroVmConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_used_mb: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MicroVmInfo {
        MicroVmInfo {
            id: VmId::new("vm-1700000000-1"),
            name: "microvm-1".to_owned(),
            running: true,
            pid: Some(4242),
            created_at: Utc::now(),
            config: Some(MicroVmConfig::new("/k", "/r")),
            cpu_percent: None,
            memory_used_mb: Some(64),
        }
    }

    #[test]
    fn zero_valued_stats_are_omitted() {
        let info = sample();
        let json = match serde_json::to_value(&info) {
            Ok(v) => v,
            Err(e) => panic!("serialization failed: {e}"),
        };
        assert!(json.get("cpu_percent").is_none(), "absent cpu must not serialize");
        assert_eq!(json["memory_used_mb"], 64);
        assert_eq!(json["pid"], 4242);
    }

    #[test]
    fn missing_config_serializes_as_null() {
        let mut info = sample();
        info.config = None;
        let json = match serde_json::to_value(&info) {
            Ok(v) => v,
            Err(e) => panic!("serialization failed: {e}"),
        };
        assert!(json["config"].is_null(), "config must be present as null");
    }

    #[test]
    fn created_at_is_rfc3339() {
        let info = sample();
        let json = match serde_json::to_value(&info) {
            Ok(v) => v,
            Err(e) => panic!("serialization failed: {e}"),
        };
        let ts = json["created_at"].as_str().unwrap_or_default();
        assert!(
            DateTime::parse_from_rfc3339(ts).is_ok(),
            "created_at must be RFC3339, got {ts}"
        );
    }

    #[test]
    fn roundtrip_preserves_identity() {
        let info = sample();
        let json = match serde_json::to_string(&info) {
            Ok(s) => s,
            Err(e) => panic!("serialization failed: {e}"),
        };
        let back: MicroVmInfo = match serde_json::from_str(&json) {
            Ok(i) => i,
            Err(e) => panic!("deserialization failed: {e}"),
        };
        assert_eq!(back.id, info.id);
        assert_eq!(back.name, info.name);
        assert_eq!(back.config, info.config);
    }
}
