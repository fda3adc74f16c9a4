//! Per-device MQTT session driver and request/response correlator
//! (§4.1).
//!
//! - [`Channel`] — raw publish/subscribe, mockable in tests
//! - [`MqttChannel`] — `rumqttc`-backed implementation, one session per
//!   device against `localhost:<port>`
//! - [`MockChannel`] — in-memory test double
//! - [`Driver`] — topic dispatch, subscriber fan-out, and the
//!   request/response correlator
//! - [`backoff::Backoff`] — capped exponential reconnect backoff
//! - [`handshake`] — the periodic liveness ping
//! - [`session`] — the real connect/subscribe/poll/reconnect loop

pub mod backoff;
pub mod channel;
pub mod config;
pub mod correlator;
pub mod driver;
pub mod error;
pub mod handshake;
pub mod mock;
pub mod session;

pub use channel::{Channel, MqttChannel};
pub use config::MqttConfig;
pub use correlator::Correlator;
pub use driver::{Driver, IncomingMessage, MqttPort};
pub use error::{MqttError, MqttResult};
pub use mock::MockChannel;
