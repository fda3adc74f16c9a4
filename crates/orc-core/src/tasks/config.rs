//! `ConfigTask` (§4.4): a composite deployment that runs an optional
//! firmware update followed by a model update and an app update, aborting
//! the remainder on the first child's failure.
//!
//! Unlike the other three tasks, `ConfigTask` never calls
//! `device.start_deploy` itself — each child enters and exits its own
//! `*Deploying` state as it runs, so the device is briefly `Ready` between
//! children rather than carrying a fourth "config_deploying" state that
//! nothing else in `State` recognizes (§3).

use std::time::Duration;

use orc_protocol::{DeviceId, OrcResult, TaskKind};

use crate::device::DeviceHandle;

use super::{AppTask, DeploymentTask, FirmwareTask, ModelTask, TaskContext};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub struct ConfigTask {
    ctx: TaskContext,
    firmware: Option<FirmwareTask>,
    model: Option<ModelTask>,
    app: Option<AppTask>,
}

impl ConfigTask {
    pub fn new(
        ctx: TaskContext,
        firmware: Option<FirmwareTask>,
        model: Option<ModelTask>,
        app: Option<AppTask>,
    ) -> Self {
        ConfigTask {
            ctx,
            firmware,
            model,
            app,
        }
    }
}

#[async_trait]
impl DeploymentTask for ConfigTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Config
    }

    fn device_id(&self) -> DeviceId {
        self.ctx.device_id()
    }

    fn device_handle(&self) -> DeviceHandle {
        self.ctx.device.clone()
    }

    /// The outer bound on the whole sequence; the executor still enforces
    /// this even though each child also carries its own deadline.
    fn timeout(&self) -> Duration {
        let mut total = Duration::ZERO;
        if let Some(t) = &self.firmware {
            total += t.timeout();
        }
        if let Some(t) = &self.model {
            total += t.timeout();
        }
        if let Some(t) = &self.app {
            total += t.timeout();
        }
        total
    }

    async fn run(&self, cancel: CancellationToken) -> OrcResult<()> {
        if let Some(task) = &self.firmware {
            task.run(cancel.clone()).await?;
        }
        if let Some(task) = &self.model {
            task.run(cancel.clone()).await?;
        }
        if let Some(task) = &self.app {
            task.run(cancel.clone()).await?;
        }
        Ok(())
    }
}
