//! `PreviewStore` (§4.5): the most recent frame seen per device, held only
//! in memory. Disabled entirely when the operator turns off previews
//! (`ArtifactsConfig::preview_enabled`), in which case `frame` always
//! returns `None` regardless of what was set.

use std::collections::HashMap;

use axum::body::Bytes;
use tokio::sync::RwLock;

use orc_protocol::DeviceId;

pub struct PreviewStore {
    enabled: bool,
    frames: RwLock<HashMap<DeviceId, Bytes>>,
}

impl PreviewStore {
    pub fn new(enabled: bool) -> Self {
        PreviewStore {
            enabled,
            frames: RwLock::new(HashMap::new()),
        }
    }

    pub async fn set_frame(&self, device_id: DeviceId, bytes: Bytes) {
        if !self.enabled {
            return;
        }
        self.frames.write().await.insert(device_id, bytes);
    }

    pub async fn frame(&self, device_id: DeviceId) -> Option<Bytes> {
        if !self.enabled {
            return None;
        }
        self.frames.read().await.get(&device_id).cloned()
    }
}
