//! Device identity and the small enums that describe its connection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric device identity. By convention this equals the TCP port the
/// device's local MQTT broker listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u16);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for DeviceId {
    fn from(port: u16) -> Self {
        DeviceId(port)
    }
}

/// Protocol dialect a device speaks, selected per-device in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Unknown,
    V1,
    V2,
}

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::Unknown
    }
}

/// Liveness of the device's MQTT session, independent of its application
/// `State` (§4.2 — `ConnectionState` is driver-owned, `State` is
/// orchestrator-owned).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Static declaration of a device, as loaded from `GlobalConfiguration`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConnection {
    pub id: DeviceId,
    pub name: String,
    #[serde(default)]
    pub device_type: DeviceType,
    /// Root directory for this device's artifacts and persisted state.
    pub data_root: std::path::PathBuf,
    /// Per-device disk quota in bytes, for the storage watcher.
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,
    #[serde(default)]
    pub auto_deletion: bool,
}

fn default_quota_bytes() -> u64 {
    1024 * 1024 * 1024 // 1 GiB
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_displays_as_port_number() {
        assert_eq!(DeviceId(1883).to_string(), "1883");
    }

    #[test]
    fn device_type_defaults_to_unknown() {
        assert_eq!(DeviceType::default(), DeviceType::Unknown);
    }

    #[test]
    fn device_connection_round_trips_through_json() {
        let conn = DeviceConnection {
            id: DeviceId(1883),
            name: "cam-01".into(),
            device_type: DeviceType::V2,
            data_root: "/var/lib/orchestrator/cam-01".into(),
            quota_bytes: default_quota_bytes(),
            auto_deletion: true,
        };
        let json = serde_json::to_string(&conn).unwrap();
        let back: DeviceConnection = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, conn.id);
        assert_eq!(back.device_type, DeviceType::V2);
    }

    #[test]
    fn device_type_is_optional_in_config() {
        let json = r#"{"id":1883,"name":"cam-01","data_root":"/tmp/cam-01"}"#;
        let conn: DeviceConnection = serde_json::from_str(json).unwrap();
        assert_eq!(conn.device_type, DeviceType::Unknown);
        assert_eq!(conn.quota_bytes, default_quota_bytes());
        assert!(!conn.auto_deletion);
    }
}
