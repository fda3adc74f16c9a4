//! `DeviceRegistry` (§4, §10.1): the one place that knows every configured
//! device's [`DeviceHandle`]. Routes, the task executor, and the daemon's
//! bootstrap all look devices up here rather than threading a `Vec` of
//! handles through each other.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use orc_mqtt::MqttPort;
use orc_protocol::DeviceId;

use crate::device::DeviceHandle;

#[derive(Clone, Default)]
pub struct DeviceRegistry {
    devices: Arc<RwLock<HashMap<DeviceId, DeviceHandle>>>,
    mqtt: Arc<RwLock<HashMap<DeviceId, Arc<dyn MqttPort>>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        DeviceRegistry::default()
    }

    pub async fn insert(&self, handle: DeviceHandle) {
        self.devices.write().await.insert(handle.id(), handle);
    }

    pub async fn get(&self, id: DeviceId) -> Option<DeviceHandle> {
        self.devices.read().await.get(&id).cloned()
    }

    pub async fn list(&self) -> Vec<DeviceHandle> {
        self.devices.read().await.values().cloned().collect()
    }

    /// Binds the MQTT port the daemon's bootstrap spawned for this device
    /// (§10.1), so routes and anything else outside the bootstrap can build
    /// a `TaskContext` without threading `Driver` handles through them.
    pub async fn bind_mqtt(&self, id: DeviceId, port: Arc<dyn MqttPort>) {
        self.mqtt.write().await.insert(id, port);
    }

    pub async fn mqtt_port(&self, id: DeviceId) -> Option<Arc<dyn MqttPort>> {
        self.mqtt.read().await.get(&id).cloned()
    }
}
