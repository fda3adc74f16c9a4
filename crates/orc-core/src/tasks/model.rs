//! `ModelTask` (§4.4): a two-phase undeploy-then-deploy protocol against a
//! single per-device model slot, keyed by the `network_id` packed into the
//! DNN package bytes (§3 `model_package`).

use std::time::Duration;

use tokio::sync::mpsc;

use orc_mqtt::IncomingMessage;
use orc_protocol::rpc::{self, DnnDeleteBody, DnnDeleteEnvelope, DnnOtaBody, DnnOtaEnvelope};
use orc_protocol::{
    model_package, properties, topics, DeploymentManifest, DeviceId, Kind, OrcError, OrcResult,
    PropertiesReport, State, TaskKind,
};

use crate::device::{DeployKind, DeviceHandle};

use super::{DeploymentTask, TaskContext};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub desired_version: String,
    pub package_uri: String,
    pub hash_value: String,
    /// Raw `.pkg`/`.rpk` bytes of the package being deployed, used only to
    /// read off its `network_id` (§4.4: "extracting network_id from the
    /// package" — the only package data available to the orchestrator at
    /// deploy time is the incoming one, so the undeploy and deploy calls
    /// share that same id).
    pub package_bytes: Vec<u8>,
    pub is_rpk: bool,
    pub undeploy_timeout: Duration,
    pub deploy_timeout: Duration,
}

pub struct ModelTask {
    ctx: TaskContext,
    spec: ModelSpec,
}

impl ModelTask {
    pub fn new(ctx: TaskContext, spec: ModelSpec) -> Self {
        ModelTask { ctx, spec }
    }

    fn network_id(&self) -> OrcResult<String> {
        let result = if self.spec.is_rpk {
            model_package::network_id_from_rpk(&self.spec.package_bytes)
        } else {
            model_package::network_id_from_pkg(&self.spec.package_bytes)
        };
        result.map_err(|e| OrcError::deployment_failed(format!("reading network_id: {e}")))
    }

    async fn undeploy(&self, network_id: &str, cancel: &CancellationToken) -> OrcResult<()> {
        let envelope = DnnDeleteEnvelope {
            ota: DnnDeleteBody::new(network_id),
        };
        self.publish_and_await(&envelope, self.spec.undeploy_timeout, cancel)
            .await
    }

    async fn deploy(&self, cancel: &CancellationToken) -> OrcResult<()> {
        let envelope = DnnOtaEnvelope {
            ota: DnnOtaBody::new(
                &self.spec.desired_version,
                &self.spec.package_uri,
                &self.spec.hash_value,
            ),
        };
        self.publish_and_await(&envelope, self.spec.deploy_timeout, cancel)
            .await
    }

    async fn publish_and_await<T: serde::Serialize>(
        &self,
        envelope: &T,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> OrcResult<()> {
        let wire = rpc::encode_v1_desired_state(envelope).map_err(|e| {
            OrcError::new(Kind::InternalInvariantViolation, format!("encode OTA body: {e}"))
        })?;
        let payload = serde_json::to_vec(&wire).map_err(|e| {
            OrcError::new(Kind::InternalInvariantViolation, format!("serialize OTA wire: {e}"))
        })?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        self.ctx
            .mqtt
            .subscribe(&topics::telemetry(), tx)
            .await
            .map_err(|e| OrcError::deployment_failed(e.to_string()))?;

        self.ctx
            .mqtt
            .publish(&topics::attributes(), &payload)
            .await
            .map_err(|e| OrcError::deployment_failed(e.to_string()))?;

        await_progress(&mut rx, timeout, cancel, &self.spec.desired_version).await
    }
}

/// Shared with the undeploy phase (which has no target version, so an empty
/// one always matches the first `Done`) and the deploy phase (which waits
/// for a `Done` carrying its own desired version).
async fn await_progress(
    rx: &mut mpsc::UnboundedReceiver<IncomingMessage>,
    timeout: Duration,
    cancel: &CancellationToken,
    desired_version: &str,
) -> OrcResult<()> {
    let mut observed = PropertiesReport::default();
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        let msg = tokio::select! {
            // Only ever cancelled via `cancel_for_device` on MQTT session
            // loss (§4.1, §8 scenario 6) — the executor's own timeout path
            // abandons `run` without touching this token.
            _ = cancel.cancelled() => return Err(OrcError::deployment_timeout("disconnected")),
            _ = &mut deadline => return Err(OrcError::deployment_timeout("model OTA phase deadline elapsed")),
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => {
                    return Err(OrcError::new(
                        Kind::InternalInvariantViolation,
                        "telemetry subscription closed unexpectedly",
                    ))
                }
            },
        };

        let Ok(report) = serde_json::from_slice::<PropertiesReport>(&msg.payload) else {
            continue;
        };
        properties::merge(&mut observed, &report);

        match observed.ota.update_status.as_str() {
            "Failed" => return Err(OrcError::firmware_update_failed("device reported OTA Failed")),
            "Done" => {
                if desired_version.is_empty() {
                    return Ok(());
                }
                if observed.versions.dnn_model_version.iter().any(|v| v == desired_version) {
                    return Ok(());
                }
            }
            _ => {}
        }
    }
}

#[async_trait]
impl DeploymentTask for ModelTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Model
    }

    fn device_id(&self) -> DeviceId {
        self.ctx.device_id()
    }

    fn device_handle(&self) -> DeviceHandle {
        self.ctx.device.clone()
    }

    fn timeout(&self) -> Duration {
        self.spec.undeploy_timeout + self.spec.deploy_timeout
    }

    async fn run(&self, cancel: CancellationToken) -> OrcResult<()> {
        let network_id = self.network_id()?;

        let manifest = DeploymentManifest {
            task_id: self.id(),
            description: format!("model {network_id} -> {}", self.spec.desired_version),
        };
        self.ctx
            .device
            .start_deploy(DeployKind::Model, manifest)
            .await?;

        let outcome = async {
            self.undeploy(&network_id, &cancel).await?;
            self.deploy(&cancel).await
        }
        .await;

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
    use orc_protocol::{model_package::fabricate_pkg, ConnectionState, DeviceConnection, DeviceType};

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

    #[tokio::test]
    async fn undeploy_then_deploy_publishes_both_phases_in_order() {
        let (device, _join) = ready_device().await;
        let channel = Arc::new(MockChannel::new());
        let (driver, _rx) = Driver::new(channel.clone(), &MqttConfig::default());
        let ctx = TaskContext::new(device.clone(), driver.clone() as Arc<dyn MqttPort>);
        let task = ModelTask::new(
            ctx,
            ModelSpec {
                desired_version: "model-v2".into(),
                package_uri: "http://x/model.pkg".into(),
                hash_value: "abc".into(),
                package_bytes: fabricate_pkg("ABCDEF"),
                is_rpk: false,
                undeploy_timeout: Duration::from_secs(5),
                deploy_timeout: Duration::from_secs(5),
            },
        );

        let run_handle = tokio::spawn(async move { task.run(CancellationToken::new()).await });

        let undeploy_msg = channel.next_published().await.unwrap();
        let undeploy_wire: serde_json::Value = serde_json::from_slice(&undeploy_msg.payload).unwrap();
        let undeploy_envelope: DnnDeleteEnvelope =
            rpc::decode_v1_desired_state(&undeploy_wire).unwrap();
        assert_eq!(undeploy_envelope.ota.delete_network_id, "ABCDEF");

        let telemetry = topics::telemetry();
        let mut undeploy_done = PropertiesReport::default();
        undeploy_done.ota.update_status = "Done".into();
        driver
            .dispatch(&telemetry, &serde_json::to_vec(&undeploy_done).unwrap())
            .await;

        let deploy_msg = channel.next_published().await.unwrap();
        let deploy_wire: serde_json::Value = serde_json::from_slice(&deploy_msg.payload).unwrap();
        let deploy_envelope: DnnOtaEnvelope = rpc::decode_v1_desired_state(&deploy_wire).unwrap();
        assert_eq!(deploy_envelope.ota.desired_version, "model-v2");

        let mut deploy_done = PropertiesReport::default();
        deploy_done.ota.update_status = "Done".into();
        deploy_done.versions.dnn_model_version = vec!["model-v2".into()];
        driver
            .dispatch(&telemetry, &serde_json::to_vec(&deploy_done).unwrap())
            .await;

        run_handle.await.unwrap().unwrap();
        assert_eq!(device.snapshot().state.name(), "ready");
    }

    #[tokio::test]
    async fn rejects_package_too_short_to_carry_a_network_id() {
        let (device, _join) = ready_device().await;
        let channel = Arc::new(MockChannel::new());
        let (driver, _rx) = Driver::new(channel, &MqttConfig::default());
        let ctx = TaskContext::new(device, driver as Arc<dyn MqttPort>);
        let task = ModelTask::new(
            ctx,
            ModelSpec {
                desired_version: "model-v2".into(),
                package_uri: "http://x/model.pkg".into(),
                hash_value: "abc".into(),
                package_bytes: vec![0u8; 4],
                is_rpk: false,
                undeploy_timeout: Duration::from_secs(5),
                deploy_timeout: Duration::from_secs(5),
            },
        );

        let err = task.run(CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind, Kind::ExternalDeploymentFailed);
    }
}
