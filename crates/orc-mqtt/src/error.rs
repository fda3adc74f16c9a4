//! MQTT driver error taxonomy (§4.1, §7 — request-level errors that bubble
//! into `orc-core`'s task and state-machine error handling).

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum MqttError {
    /// A `Request` (§4.1) received no reply within its timeout.
    #[error("request timed out waiting for a response")]
    Timeout,
    /// The session was lost while a `Request` was outstanding, or a
    /// publish/subscribe was attempted on a dead session (§4.1, §7 —
    /// "MQTT disconnects... abort in-flight Requests with a retriable
    /// error").
    #[error("mqtt session disconnected")]
    Disconnected,
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("unsubscribe failed: {0}")]
    Unsubscribe(String),
    #[error("payload serialization failed: {0}")]
    Serialization(String),
    #[error("connect failed: {0}")]
    Connect(String),
}

pub type MqttResult<T> = Result<T, MqttError>;
