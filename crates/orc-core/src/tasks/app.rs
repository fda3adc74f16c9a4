//! `AppTask` (§4.4): validates an Aot-Xtensa module, publishes a deployment
//! manifest pointing at the artifact server, and waits for the device's
//! reconciliation status.

use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use orc_protocol::rpc::{
    DeploymentManifest as RpcDeploymentManifest, DeploymentManifestModule, DeploymentStatus,
};
use orc_protocol::{
    aot, topics, DeploymentManifest, DeviceId, Kind, OrcError, OrcResult, State, TaskKind,
};

use crate::device::{DeployKind, DeviceHandle};

use super::{DeploymentTask, TaskContext};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct AppSpec {
    pub deployment_id: String,
    pub module_id: String,
    pub module_bytes: Vec<u8>,
    pub download_url: String,
    pub timeout: Duration,
}

pub struct AppTask {
    ctx: TaskContext,
    spec: AppSpec,
}

impl AppTask {
    pub fn new(ctx: TaskContext, spec: AppSpec) -> Self {
        AppTask { ctx, spec }
    }

    fn manifest(&self) -> RpcDeploymentManifest {
        let hash = format!("{:x}", Sha256::digest(&self.spec.module_bytes));
        RpcDeploymentManifest {
            deployment_id: self.spec.deployment_id.clone(),
            modules: vec![DeploymentManifestModule {
                module_id: self.spec.module_id.clone(),
                download_url: self.spec.download_url.clone(),
                hash,
            }],
        }
    }

    async fn publish_manifest(&self) -> OrcResult<()> {
        let payload = serde_json::json!({ "deployment": self.manifest() });
        let bytes = serde_json::to_vec(&payload).map_err(|e| {
            OrcError::new(Kind::InternalInvariantViolation, format!("serialize manifest: {e}"))
        })?;
        self.ctx
            .mqtt
            .publish(&topics::attributes(), &bytes)
            .await
            .map_err(|e| OrcError::deployment_failed(e.to_string()))
    }

    async fn await_status(&self, cancel: &CancellationToken) -> OrcResult<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.ctx
            .mqtt
            .subscribe(&topics::attributes(), tx)
            .await
            .map_err(|e| OrcError::deployment_failed(e.to_string()))?;

        let deadline = tokio::time::sleep(self.spec.timeout);
        tokio::pin!(deadline);

        loop {
            let msg = tokio::select! {
                // Only ever cancelled via `cancel_for_device` on MQTT session
                // loss (§4.1, §8 scenario 6) — the executor's own timeout
                // path abandons `run` without touching this token.
                _ = cancel.cancelled() => return Err(OrcError::deployment_timeout("disconnected")),
                _ = &mut deadline => return Err(OrcError::deployment_timeout("app deployment status deadline elapsed")),
                msg = rx.recv() => match msg {
                    Some(msg) => msg,
                    None => {
                        return Err(OrcError::new(
                            Kind::InternalInvariantViolation,
                            "attributes subscription closed unexpectedly",
                        ))
                    }
                },
            };

            let Ok(value) = serde_json::from_slice::<serde_json::Value>(&msg.payload) else {
                continue;
            };
            let Some(status_value) = value.get("deploymentStatus") else {
                continue;
            };
            let Ok(status) = serde_json::from_value::<DeploymentStatus>(status_value.clone())
            else {
                continue;
            };
            if status.deployment_id != self.spec.deployment_id {
                continue;
            }
            return if status.is_ok() {
                Ok(())
            } else {
                Err(OrcError::deployment_failed(format!(
                    "device reported reconcile_status {}",
                    status.reconcile_status
                )))
            };
        }
    }
}

#[async_trait]
impl DeploymentTask for AppTask {
    fn kind(&self) -> TaskKind {
        TaskKind::App
    }

    fn device_id(&self) -> DeviceId {
        self.ctx.device_id()
    }

    fn device_handle(&self) -> DeviceHandle {
        self.ctx.device.clone()
    }

    fn timeout(&self) -> Duration {
        self.spec.timeout
    }

    async fn run(&self, cancel: CancellationToken) -> OrcResult<()> {
        if !aot::has_aot_header(&self.spec.module_bytes) {
            // §8 AppTask invalid-file scenario: fail before any transition
            // or MQTT traffic.
            return Err(OrcError::invalid_app_file());
        }

        let manifest = DeploymentManifest {
            task_id: self.id(),
            description: format!("app module {}", self.spec.module_id),
        };
        self.ctx
            .device
            .start_deploy(DeployKind::App, manifest)
            .await?;

        let outcome = match self.publish_manifest().await {
            Ok(()) => self.await_status(&cancel).await,
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(()) => {
                let _ = self.ctx.device.transition(State::Ready).await;
            }
            Err(e) => {
                let _ = self
                    .ctx
                    .device
                    .transition(State::Error {
                        reason: e.message.clone(),
                    })
                    .await;
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use orc_mqtt::{Driver, MockChannel, MqttConfig, MqttPort};
    use orc_protocol::{ConnectionState, DeviceConnection, DeviceType, State};

    use crate::device;
    use crate::notifications::NotificationBus;

    use super::*;

    async fn ready_device() -> (device::DeviceHandle, tokio::task::JoinHandle<()>) {
        let conn = DeviceConnection {
            id: DeviceId(1883),
            name: "cam-01".into(),
            device_type: DeviceType::V1,
            data_root: "/tmp/cam-01".into(),
            quota_bytes: 1024,
            auto_deletion: false,
        };
        let (handle, join) = device::spawn(&conn, NotificationBus::new());
        handle.transition(State::Disconnected).await.unwrap();
        handle.set_connection_state(ConnectionState::Connected).await;
        handle.transition(State::Ready).await.unwrap();
        (handle, join)
    }

    fn aot_module() -> Vec<u8> {
        let mut bytes = aot::AOT_HEADER.to_vec();
        bytes.extend_from_slice(b"xtensa-rest-of-module");
        bytes
    }

    #[tokio::test]
    async fn rejects_module_without_aot_header_before_any_publish() {
        let (device, _join) = ready_device().await;
        let channel = Arc::new(MockChannel::new());
        let (driver, _rx) = Driver::new(channel.clone(), &MqttConfig::default());
        let ctx = TaskContext::new(device.clone(), driver as Arc<dyn MqttPort>);
        let task = AppTask::new(
            ctx,
            AppSpec {
                deployment_id: "dep-1".into(),
                module_id: "mod-1".into(),
                module_bytes: b"PK\x03\x04not-aot".to_vec(),
                download_url: "http://x/app.aot".into(),
                timeout: Duration::from_secs(5),
            },
        );

        let err = task.run(CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind, Kind::ExternalDeploymentInvalidAppFile);
        assert!(channel.published().await.is_empty());
        assert_eq!(device.snapshot().state.name(), "ready");
    }

    #[tokio::test]
    async fn succeeds_when_device_reports_ok_reconcile_status() {
        let (device, _join) = ready_device().await;
        let channel = Arc::new(MockChannel::new());
        let (driver, _rx) = Driver::new(channel.clone(), &MqttConfig::default());
        let ctx = TaskContext::new(device.clone(), driver.clone() as Arc<dyn MqttPort>);
        let task = AppTask::new(
            ctx,
            AppSpec {
                deployment_id: "dep-1".into(),
                module_id: "mod-1".into(),
                module_bytes: aot_module(),
                download_url: "http://x/app.aot".into(),
                timeout: Duration::from_secs(5),
            },
        );

        let run_handle = tokio::spawn(async move { task.run(CancellationToken::new()).await });

        let published = channel.next_published().await.unwrap();
        let sent: serde_json::Value = serde_json::from_slice(&published.payload).unwrap();
        assert_eq!(sent["deployment"]["deploymentId"], serde_json::Value::Null);
        assert_eq!(sent["deployment"]["deployment_id"], "dep-1");

        let reply = serde_json::json!({
            "deploymentStatus": {
                "deployment_id": "dep-1",
                "reconcile_status": "ok",
            }
        });
        driver
            .dispatch(&topics::attributes(), &serde_json::to_vec(&reply).unwrap())
            .await;

        run_handle.await.unwrap().unwrap();
        assert_eq!(device.snapshot().state.name(), "ready");
    }
}
