//! Shared axum state for the artifact ingestion server: one
//! [`DeviceArtifacts`] bundle per configured device, keyed by
//! [`DeviceId`], plus the callback that turns a grouping/quota event into
//! a [`Notification`] the daemon forwards to its bus.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use orc_protocol::{DeviceId, Notification};

use crate::file_grouping::FileGrouping;
use crate::preview::PreviewStore;
use crate::storage_watcher::StorageSizeWatcher;

/// Everything the ingestion routes need for one device.
#[derive(Clone)]
pub struct DeviceArtifacts {
    pub data_root: PathBuf,
    pub grouping: Arc<FileGrouping>,
    pub watcher: Arc<StorageSizeWatcher>,
}

/// One entry per configured device plus the process-wide preview store
/// and notification sink. Cheap to clone (every field is an `Arc`), as
/// axum's `State` extractor expects.
#[derive(Clone)]
pub struct ArtifactState {
    devices: Arc<HashMap<DeviceId, DeviceArtifacts>>,
    pub preview: Arc<PreviewStore>,
    pub on_notification: Arc<dyn Fn(Notification) + Send + Sync>,
}

impl ArtifactState {
    pub fn new(
        devices: HashMap<DeviceId, DeviceArtifacts>,
        preview_enabled: bool,
        on_notification: Arc<dyn Fn(Notification) + Send + Sync>,
    ) -> Self {
        ArtifactState {
            devices: Arc::new(devices),
            preview: Arc::new(PreviewStore::new(preview_enabled)),
            on_notification,
        }
    }

    pub fn device(&self, id: DeviceId) -> Option<&DeviceArtifacts> {
        self.devices.get(&id)
    }

    pub fn device_ids(&self) -> impl Iterator<Item = &DeviceId> {
        self.devices.keys()
    }
}

#[cfg(test)]
pub fn test_state(device_id: DeviceId, data_root: PathBuf) -> ArtifactState {
    use crate::file_grouping::DEFAULT_RETENTION;

    let watcher = Arc::new(StorageSizeWatcher::new(
        device_id,
        data_root.clone(),
        1024 * 1024 * 1024,
        false,
        Arc::new(|_| {}),
    ));
    let mut devices = HashMap::new();
    devices.insert(
        device_id,
        DeviceArtifacts {
            data_root,
            grouping: Arc::new(FileGrouping::new(DEFAULT_RETENTION)),
            watcher,
        },
    );
    ArtifactState::new(devices, true, Arc::new(|_| {}))
}
