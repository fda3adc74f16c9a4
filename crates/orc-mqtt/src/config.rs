//! Per-device MQTT session configuration (§4.1, §5 — request/handshake
//! timeouts, reconnect backoff cap).

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// Local broker host. Each device's session connects to
    /// `localhost:<device.port>` (§4.1), so this is almost always
    /// `"localhost"`; kept configurable for tests that bind a mock broker
    /// elsewhere.
    #[serde(default = "default_host")]
    pub broker_host: String,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u16,
    /// Default per-`Request` timeout (§5: "default 30s").
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Handshake ping interval (§4.1: "every 60s").
    #[serde(default = "default_handshake_interval_secs")]
    pub handshake_interval_secs: u64,
    /// Handshake ping timeout (§5: "handshake 2s").
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    /// Consecutive handshake failures before demoting to `Disconnected`
    /// (§4.1: "three consecutive failures").
    #[serde(default = "default_handshake_failure_threshold")]
    pub handshake_failure_threshold: u32,
    /// Exponential reconnect backoff cap (§4.1, §5: "cap 30s").
    #[serde(default = "default_reconnect_backoff_cap_secs")]
    pub reconnect_backoff_cap_secs: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_keepalive_secs() -> u16 {
    30
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_handshake_interval_secs() -> u64 {
    60
}
fn default_handshake_timeout_secs() -> u64 {
    2
}
fn default_handshake_failure_threshold() -> u32 {
    3
}
fn default_reconnect_backoff_cap_secs() -> u64 {
    30
}

impl MqttConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn handshake_interval(&self) -> Duration {
        Duration::from_secs(self.handshake_interval_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn reconnect_backoff_cap(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_cap_secs)
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        MqttConfig {
            broker_host: default_host(),
            keepalive_secs: default_keepalive_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            handshake_interval_secs: default_handshake_interval_secs(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            handshake_failure_threshold: default_handshake_failure_threshold(),
            reconnect_backoff_cap_secs: default_reconnect_backoff_cap_secs(),
        }
    }
}
