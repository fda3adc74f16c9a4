//! Deployment task implementations (§4.4): `AppTask`, `ModelTask`,
//! `FirmwareTask`, `ConfigTask`, behind a common [`DeploymentTask`]
//! interface (§9: "closed tagged variant... with a common interface
//! `{Run, Stop, State, ID, Timeout, HistoryInfo}`" — modeled here as a
//! trait object rather than an enum match, matching the `Channel`/
//! `Persistency` trait-object idiom already used elsewhere in this
//! workspace).

pub mod app;
pub mod config;
pub mod firmware;
pub mod model;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use orc_mqtt::MqttPort;
use orc_protocol::{DeviceId, OrcResult, TaskId, TaskKind};

use crate::device::DeviceHandle;

pub use app::AppTask;
pub use config::ConfigTask;
pub use firmware::FirmwareTask;
pub use model::ModelTask;

/// Dependencies every deployment task needs: the device it targets (for
/// `start_deploy`/`transition`) and the MQTT session driver that carries
/// its sub-protocol (§4.4).
#[derive(Clone)]
pub struct TaskContext {
    pub device: DeviceHandle,
    pub mqtt: Arc<dyn MqttPort>,
}

impl TaskContext {
    pub fn new(device: DeviceHandle, mqtt: Arc<dyn MqttPort>) -> Self {
        TaskContext { device, mqtt }
    }

    pub fn device_id(&self) -> DeviceId {
        self.device.id()
    }
}

/// Common interface over the four concrete deployment tasks (§4.3, §4.4,
/// §9). The task executor holds `Arc<dyn DeploymentTask>`; it never knows
/// which concrete kind it is scheduling.
#[async_trait]
pub trait DeploymentTask: Send + Sync {
    /// Derived from `kind() + device_id()` (§3) — used by the executor to
    /// coalesce a second submission of the same deployment while the
    /// first is still outstanding.
    fn id(&self) -> TaskId {
        TaskId::new(self.kind(), self.device_id())
    }

    fn kind(&self) -> TaskKind;
    fn device_id(&self) -> DeviceId;

    /// The device this task targets. The executor uses this to force the
    /// device back to `Ready`/`Error` itself when its own timeout elapses
    /// before `run` gets a chance to (§4.3) — `run`'s future is abandoned
    /// mid-flight at that point, so it never reaches its own end-of-`run`
    /// transition.
    fn device_handle(&self) -> DeviceHandle;

    /// Outer deadline the executor enforces around `run` (§5).
    fn timeout(&self) -> Duration;

    /// Drive the device through this task's sub-protocol. `cancel` is
    /// observed at the task's suspension points so the executor's
    /// timeout/`Stop()` path can interrupt it cooperatively (§4.3, §5).
    async fn run(&self, cancel: CancellationToken) -> OrcResult<()>;

    /// Idempotent cleanup invoked by the executor after cancellation
    /// (§5: "must be idempotent and complete within `task.timeout()/2`").
    /// None of the concrete tasks hold resources beyond the MQTT
    /// subscriptions `run` itself drops on return, so this is a no-op —
    /// cancellation is carried entirely by `cancel`.
    async fn stop(&self) -> OrcResult<()> {
        Ok(())
    }
}
