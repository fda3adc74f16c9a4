//! Per-device bootstrap (§10.1): for each configured device, builds an MQTT
//! session (driver + reconnecting session loop + handshake ping), bridges
//! its connection-state and reported properties into the device's owner
//! loop, and registers both in the shared [`DeviceRegistry`].

use std::sync::Arc;

use tokio::sync::mpsc;

use orc_core::device;
use orc_core::notifications::NotificationBus;
use orc_core::registry::DeviceRegistry;
use orc_core::task_executor::TaskExecutorHandle;
use orc_mqtt::handshake::HandshakeOutcome;
use orc_mqtt::{Driver, MqttChannel, MqttConfig, MqttPort};
use orc_protocol::{ConnectionState, DeviceConnection, Notification, PropertiesReport};

/// Spawns every background task a device needs (session loop, handshake
/// ping, connection-state bridge, attributes/telemetry listener) and
/// registers the device and its MQTT port in `registry`. Each task runs
/// until the process exits; callers don't join them individually — they
/// are torn down with the process on shutdown.
pub async fn bootstrap_device(
    conn: &DeviceConnection,
    notifications: NotificationBus,
    registry: &DeviceRegistry,
    executor: &TaskExecutorHandle,
) {
    let (handle, _owner_join) = device::spawn(conn, notifications.clone());
    registry.insert(handle.clone()).await;

    let port = conn.id.0;
    let mqtt_config = MqttConfig::default();

    let (initial_channel, _unused_eventloop) = MqttChannel::connect(&mqtt_config, port);
    let (driver, mut connection_rx) = Driver::new(Arc::new(initial_channel), &mqtt_config);
    registry
        .bind_mqtt(conn.id, driver.clone() as Arc<dyn MqttPort>)
        .await;

    tokio::spawn(orc_mqtt::session::run(driver.clone(), mqtt_config.clone(), port));

    // Bridge the driver's connection-state watch into the device's own
    // ConnectionState — only the device's owner loop may call `transition`,
    // so the driver never touches the device directly (§4.2). A loss also
    // cancels whatever deployment task is currently running against this
    // device (§8 scenario 6): the task's own `run` observes
    // `cancel.cancelled()` at its next suspension point and fails with a
    // "disconnected" reason rather than riding out its full timeout.
    {
        let handle = handle.clone();
        let executor = executor.clone();
        let device_id = conn.id;
        tokio::spawn(async move {
            loop {
                if connection_rx.changed().await.is_err() {
                    return;
                }
                let state = *connection_rx.borrow();
                if state == ConnectionState::Disconnected {
                    executor.cancel_for_device(device_id).await;
                }
                handle.set_connection_state(state).await;
            }
        });
    }

    // Periodic handshake ping; three consecutive failures demote the
    // device's ConnectionState to Disconnected (§4.1).
    {
        let driver = driver.clone();
        let handle = handle.clone();
        let notifications = notifications.clone();
        let device_id = conn.id;
        let interval = mqtt_config.handshake_interval();
        let timeout = mqtt_config.handshake_timeout();
        let failure_threshold = mqtt_config.handshake_failure_threshold;

        tokio::spawn(async move {
            orc_mqtt::handshake::run(driver, interval, timeout, failure_threshold, move |outcome| {
                if let HandshakeOutcome::Failed { consecutive_failures } = outcome {
                    notifications.publish(Notification::DeviceHandshakeFailed {
                        device_id,
                        consecutive_failures,
                        at: chrono::Utc::now(),
                    });
                    if consecutive_failures >= failure_threshold {
                        let handle = handle.clone();
                        tokio::spawn(async move {
                            handle.set_connection_state(ConnectionState::Disconnected).await;
                        });
                    }
                }
            })
            .await;
        });
    }

    subscribe_properties(&driver, &handle, orc_protocol::topics::attributes());
    subscribe_properties(&driver, &handle, orc_protocol::topics::telemetry());
}

/// Subscribes to `topic` and merges every incoming publish into the
/// device's `PropertiesReport` (§4.2: "the first successful merge after a
/// handshake brings a freshly-connected device from Disconnected to
/// Ready"). A payload that doesn't parse as a `PropertiesReport` is logged
/// at debug and dropped — a dialect mismatch is an expected occurrence
/// while a device session is still handshaking, not a bug.
fn subscribe_properties(driver: &Arc<Driver<MqttChannel>>, handle: &device::DeviceHandle, topic: String) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let driver = driver.clone();
    let handle = handle.clone();
    tokio::spawn(async move {
        if let Err(err) = driver.subscribe(&topic, tx).await {
            tracing::warn!(%topic, %err, "failed to subscribe for properties");
            return;
        }
        while let Some(msg) = rx.recv().await {
            match serde_json::from_slice::<PropertiesReport>(&msg.payload) {
                Ok(report) => {
                    let _ = handle.merge_properties(report).await;
                }
                Err(err) => {
                    tracing::debug!(%err, topic = %msg.topic, "payload did not parse as a properties report");
                }
            }
        }
    });
}
