//! Shared black-box harness for scenario tests.
//!
//! Wires up an [`AppState`] exactly the way `orc-daemon`'s bootstrap does,
//! except every MQTT session is a [`MockChannel`] so a test can drive a
//! device's wire protocol directly instead of talking to a real broker.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;

use orc_artifacts::storage_watcher::StorageSizeWatcher;
use orc_artifacts::{ArtifactState, DeviceArtifacts};
use orc_core::config::{ConfigHandle, GlobalConfiguration, InMemory};
use orc_core::deploy_history::DeployHistory;
use orc_core::device::{self, DeviceHandle};
use orc_core::notifications::NotificationBus;
use orc_core::registry::DeviceRegistry;
use orc_core::state::AppState;
use orc_core::task_executor::{self, TaskExecutorHandle};
use orc_mqtt::{Driver, MockChannel, MqttConfig, MqttPort};
use orc_protocol::{ConnectionState, DeviceConnection, DeviceId, DeviceType, State as DeviceState};

/// One device wired into a harness: its owner-loop handle and the mock
/// channel backing its MQTT session, so a test can both call the REST API
/// and inspect/feed the wire traffic that API triggers.
pub struct HarnessDevice {
    pub id: DeviceId,
    pub handle: DeviceHandle,
    pub channel: Arc<MockChannel>,
    pub driver: Arc<Driver<MockChannel>>,
}

/// End-to-end test harness covering the REST/WS API, the task executor, and
/// the artifact ingestion server, all backed by mock MQTT channels and a
/// temporary directory instead of a real broker and filesystem.
pub struct TestHarness {
    pub state: AppState,
    pub router: Router,
    pub artifact_router: Router,
    pub notifications: NotificationBus,
    pub executor: TaskExecutorHandle,
    pub history: Arc<DeployHistory>,
    pub registry: DeviceRegistry,
    artifact_devices: HashMap<DeviceId, DeviceArtifacts>,
    data_dir: TempDir,
}

impl TestHarness {
    /// A harness with no devices registered yet.
    pub fn empty() -> Self {
        let notifications = NotificationBus::new();
        let history = Arc::new(DeployHistory::new());
        let (executor, _join) = task_executor::spawn(history.clone(), notifications.clone());
        let registry = DeviceRegistry::new();
        let config = ConfigHandle::new(GlobalConfiguration::default(), Arc::new(InMemory::new()));

        let state = AppState {
            registry: registry.clone(),
            config,
            executor: executor.clone(),
            history: history.clone(),
            notifications: notifications.clone(),
        };
        let router = orc_core::routes::build_router(state.clone());

        let data_dir = tempfile::tempdir().expect("tempdir");
        let artifact_router = orc_artifacts::build_router(ArtifactState::new(
            HashMap::new(),
            true,
            Arc::new(|_| {}),
        ));

        TestHarness {
            state,
            router,
            artifact_router,
            notifications,
            executor,
            history,
            registry,
            artifact_devices: HashMap::new(),
            data_dir,
        }
    }

    /// Registers a `Ready` device with a bound `MockChannel`, and, if
    /// `with_artifacts` is set, a matching `DeviceArtifacts` entry rooted at
    /// a fresh subdirectory of the harness's temp dir. Rebuilds the artifact
    /// router so later calls see the new device.
    pub async fn add_ready_device(&mut self, id: u16, with_artifacts: bool) -> HarnessDevice {
        let data_root = self.data_dir.path().join(id.to_string());
        let conn = DeviceConnection {
            id: DeviceId(id),
            name: format!("cam-{id}"),
            device_type: DeviceType::V1,
            data_root: data_root.clone(),
            quota_bytes: 1024 * 1024 * 1024,
            auto_deletion: false,
        };

        let (handle, _join) = device::spawn(&conn, self.notifications.clone());
        handle.transition(DeviceState::Disconnected).await.unwrap();
        handle.set_connection_state(ConnectionState::Connected).await;
        handle.transition(DeviceState::Ready).await.unwrap();
        self.registry.insert(handle.clone()).await;

        let channel = Arc::new(MockChannel::new());
        let (driver, _rx) = Driver::new(channel.clone(), &MqttConfig::default());
        self.registry
            .bind_mqtt(conn.id, driver.clone() as Arc<dyn MqttPort>)
            .await;

        if with_artifacts {
            tokio::fs::create_dir_all(&data_root).await.ok();
            let watcher = Arc::new(StorageSizeWatcher::new(
                conn.id,
                data_root.clone(),
                conn.quota_bytes,
                conn.auto_deletion,
                Arc::new(|_| {}),
            ));
            self.artifact_devices.insert(
                conn.id,
                DeviceArtifacts {
                    data_root,
                    grouping: Arc::new(orc_artifacts::FileGrouping::new(
                        orc_artifacts::file_grouping::DEFAULT_RETENTION,
                    )),
                    watcher,
                },
            );
            self.artifact_router = orc_artifacts::build_router(ArtifactState::new(
                self.artifact_devices.clone(),
                true,
                Arc::new(|_| {}),
            ));
        }

        HarnessDevice {
            id: conn.id,
            handle,
            channel,
            driver,
        }
    }

    pub fn data_root(&self, id: u16) -> PathBuf {
        self.data_dir.path().join(id.to_string())
    }
}
