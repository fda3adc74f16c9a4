//! The real per-device session loop: connect to `localhost:<port>`,
//! subscribe to every topic under the device's namespace, drive the
//! `rumqttc` event loop, dispatch incoming publishes to the `Driver`, and
//! reconnect with exponential backoff on loss (§4.1 Session lifecycle).

use std::sync::Arc;

use rumqttc::{Event, EventLoop, Packet};

use orc_protocol::topics;

use crate::backoff::Backoff;
use crate::channel::MqttChannel;
use crate::config::MqttConfig;
use crate::driver::Driver;

/// Runs forever. Spawn as a background task from the device's owner
/// loop; the owner observes `driver.connection_state()` (a `watch`
/// receiver) to decide when to call `Device::transition`.
pub async fn run(driver: Arc<Driver<MqttChannel>>, config: MqttConfig, port: u16) -> ! {
    let mut backoff = Backoff::new(config.reconnect_backoff_cap());

    loop {
        driver.on_connecting();
        let (channel, eventloop) = MqttChannel::connect(&config, port);
        let channel = Arc::new(channel);
        driver.set_channel(channel.clone()).await;

        match run_connected(&driver, channel, eventloop, &topics::subscribe_all()).await {
            ConnectedExit::LoopError => {
                tracing::warn!(port, "mqtt event loop error, reconnecting");
            }
            ConnectedExit::SubscribeFailed => {
                tracing::warn!(port, "initial subscribe failed, reconnecting");
            }
        }

        driver.on_disconnected().await;
        let delay = backoff.next_delay();
        tracing::info!(port, delay_ms = delay.as_millis() as u64, "backing off before reconnect");
        tokio::time::sleep(delay).await;
    }
}

enum ConnectedExit {
    LoopError,
    SubscribeFailed,
}

async fn run_connected(
    driver: &Arc<Driver<MqttChannel>>,
    channel: Arc<MqttChannel>,
    mut eventloop: EventLoop,
    subscribe_filter: &str,
) -> ConnectedExit {
    use crate::channel::Channel;

    if let Err(e) = channel.subscribe(subscribe_filter).await {
        tracing::warn!(error = %e, "subscribe failed");
        return ConnectedExit::SubscribeFailed;
    }

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                driver.on_connected();
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                driver.dispatch(&publish.topic, &publish.payload).await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "mqtt event loop error");
                return ConnectedExit::LoopError;
            }
        }
    }
}
