//! The `Channel` trait and its `rumqttc`-backed implementation — the raw
//! publish/subscribe primitive the `Driver` (§4.1) is built on.

use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};

use crate::config::MqttConfig;
use crate::error::{MqttError, MqttResult};

/// Abstraction over raw MQTT publish/subscribe, so the `Driver` and its
/// correlator can be exercised in tests without a real broker
/// (`MockChannel` in `mock.rs` is the test double).
#[async_trait]
pub trait Channel: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> MqttResult<()>;
    async fn subscribe(&self, topic: &str) -> MqttResult<()>;
    async fn unsubscribe(&self, topic: &str) -> MqttResult<()>;
}

/// One device's MQTT session: a `rumqttc::AsyncClient` connected to
/// `localhost:<device.port>` with a random client id (§4.1).
///
/// The paired `EventLoop` is returned separately — the caller (the
/// device's owner loop, via `orc-core`) drives it with `eventloop.poll()`
/// and feeds each incoming publish to `Driver::dispatch`.
pub struct MqttChannel {
    client: AsyncClient,
}

impl MqttChannel {
    /// Connect to the device's local broker at `localhost:<port>`.
    pub fn connect(config: &MqttConfig, port: u16) -> (Self, EventLoop) {
        let client_id = format!("orc-{port}-{}", random_suffix());
        let mut options = MqttOptions::new(client_id, &config.broker_host, port);
        options.set_keep_alive(std::time::Duration::from_secs(config.keepalive_secs.into()));
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, 64);
        (MqttChannel { client }, eventloop)
    }
}

fn random_suffix() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    format!("{:08x}", rng.gen::<u32>())
}

#[async_trait]
impl Channel for MqttChannel {
    async fn publish(&self, topic: &str, payload: &[u8]) -> MqttResult<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| MqttError::Publish(e.to_string()))
    }

    async fn subscribe(&self, topic: &str) -> MqttResult<()> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| MqttError::Subscribe(e.to_string()))
    }

    async fn unsubscribe(&self, topic: &str) -> MqttResult<()> {
        self.client
            .unsubscribe(topic)
            .await
            .map_err(|e| MqttError::Unsubscribe(e.to_string()))
    }
}
