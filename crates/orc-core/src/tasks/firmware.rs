//! `FirmwareTask` (§4.4): drives a device through the OTA firmware
//! sub-protocol — publish desired state, watch telemetry for
//! `Downloading → Updating → Done|Failed`, with a same-version guard that
//! skips the OTA entirely (§8 scenario 1).

use std::time::Duration;

use tokio::sync::mpsc;

use orc_mqtt::IncomingMessage;
use orc_protocol::rpc::{self, FirmwareModule, OtaUpdateBody, OtaUpdateEnvelope};
use orc_protocol::{
    properties, topics, DeploymentManifest, DeviceId, Kind, OrcError, OrcResult, PropertiesReport,
    State, TaskKind,
};

use crate::device::{DeployKind, DeviceHandle};

use super::{DeploymentTask, TaskContext};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct FirmwareSpec {
    pub module: FirmwareModule,
    pub desired_version: String,
    pub package_uri: String,
    pub hash_value: String,
}

pub struct FirmwareTask {
    ctx: TaskContext,
    spec: FirmwareSpec,
    timeout: Duration,
}

impl FirmwareTask {
    pub fn new(ctx: TaskContext, spec: FirmwareSpec, timeout: Duration) -> Self {
        FirmwareTask { ctx, spec, timeout }
    }

    fn current_version(&self, report: &PropertiesReport) -> String {
        match self.spec.module {
            FirmwareModule::SensorFw => report.versions.sensor_fw_version.clone(),
            FirmwareModule::ApFw => report.versions.ap_fw_version.clone(),
        }
    }

    /// §4.4 step 1: `{UpdateModule, DesiredVersion, PackageUri, HashValue}`
    /// base64-encoded under the V1 placeholder key.
    async fn publish_desired_state(&self) -> OrcResult<()> {
        let envelope = OtaUpdateEnvelope {
            ota: OtaUpdateBody::new(
                self.spec.module,
                &self.spec.desired_version,
                &self.spec.package_uri,
                &self.spec.hash_value,
            ),
        };
        let wire = rpc::encode_v1_desired_state(&envelope).map_err(|e| {
            OrcError::new(Kind::InternalInvariantViolation, format!("encode OTA body: {e}"))
        })?;
        let payload = serde_json::to_vec(&wire).map_err(|e| {
            OrcError::new(Kind::InternalInvariantViolation, format!("serialize OTA wire: {e}"))
        })?;
        self.ctx
            .mqtt
            .publish(&topics::attributes(), &payload)
            .await
            .map_err(|e| OrcError::deployment_failed(e.to_string()))
    }

    /// §4.4 steps 2-3: accumulate partial telemetry reports until a
    /// distinct `Done` arrives with the matching reported version, or
    /// `Failed`, or the deadline/cancellation fires.
    async fn await_progress(
        &self,
        rx: &mut mpsc::UnboundedReceiver<IncomingMessage>,
        cancel: &CancellationToken,
    ) -> OrcResult<()> {
        let mut observed = PropertiesReport::default();
        loop {
            let msg = tokio::select! {
                // The executor only cancels this token from `cancel_for_device`
                // (§4.1, §8 scenario 6: MQTT session loss) — its own
                // timeout path never touches `cancel`, so this is always a
                // disconnect (see `task_executor::start_task`).
                _ = cancel.cancelled() => return Err(OrcError::deployment_timeout("disconnected")),
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
                    let reached = self.current_version(&observed);
                    if reached == self.spec.desired_version {
                        return Ok(());
                    }
                    // Done reported before the version field caught up to
                    // this specific deploy; keep waiting for a later
                    // telemetry message to confirm the match.
                }
                _ => {}
            }
        }
    }
}

#[async_trait]
impl DeploymentTask for FirmwareTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Firmware
    }

    fn device_id(&self) -> DeviceId {
        self.ctx.device_id()
    }

    fn device_handle(&self) -> DeviceHandle {
        self.ctx.device.clone()
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self, cancel: CancellationToken) -> OrcResult<()> {
        let snapshot = self.ctx.device.snapshot();
        if self.current_version(&snapshot.properties) == self.spec.desired_version {
            // §8 scenario 1: fail fast, no MQTT message, no transition.
            return Err(OrcError::firmware_same_version());
        }

        let manifest = DeploymentManifest {
            task_id: self.id(),
            description: format!(
                "firmware {:?} -> {}",
                self.spec.module, self.spec.desired_version
            ),
        };
        self.ctx
            .device
            .start_deploy(DeployKind::Firmware, manifest)
            .await?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        self.ctx
            .mqtt
            .subscribe(&topics::telemetry(), tx)
            .await
            .map_err(|e| OrcError::deployment_failed(e.to_string()))?;

        let outcome = match self.publish_desired_state().await {
            Ok(()) => self.await_progress(&mut rx, &cancel).await,
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
    use std::time::Duration;

    use orc_mqtt::{Driver, MockChannel, MqttConfig, MqttPort};
    use orc_protocol::{ConnectionState, DeviceConnection, DeviceId, DeviceType, State};

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
    async fn same_version_fails_fast_without_publishing() {
        let (device, _join) = ready_device().await;
        let mut report = PropertiesReport::default();
        report.versions.sensor_fw_version = "020000".into();
        device.merge_properties(report).await.unwrap();

        let channel = Arc::new(MockChannel::new());
        let (driver, _rx) = Driver::new(channel.clone(), &MqttConfig::default());
        let ctx = TaskContext::new(device.clone(), driver as Arc<dyn MqttPort>);
        let task = FirmwareTask::new(
            ctx,
            FirmwareSpec {
                module: FirmwareModule::SensorFw,
                desired_version: "020000".into(),
                package_uri: "http://x/fw.bin".into(),
                hash_value: "abc".into(),
            },
            Duration::from_secs(5),
        );

        let err = task.run(CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind, Kind::ExternalFirmwareSameVersion);
        assert!(channel.published().await.is_empty());
        assert_eq!(device.snapshot().state.name(), "ready");
    }

    #[tokio::test]
    async fn ota_success_after_done_with_matching_version() {
        let (device, _join) = ready_device().await;
        let channel = Arc::new(MockChannel::new());
        let (driver, _rx) = Driver::new(channel.clone(), &MqttConfig::default());
        let ctx = TaskContext::new(device.clone(), driver.clone() as Arc<dyn MqttPort>);
        let task = FirmwareTask::new(
            ctx,
            FirmwareSpec {
                module: FirmwareModule::SensorFw,
                desired_version: "020100".into(),
                package_uri: "http://x/fw.bin".into(),
                hash_value: "abc".into(),
            },
            Duration::from_secs(5),
        );

        let run_handle = tokio::spawn(async move { task.run(CancellationToken::new()).await });

        // Let the task publish its desired state and subscribe to telemetry
        // before the feeder fabricates a progress stream.
        let _desired_state = channel.next_published().await.unwrap();

        let telemetry = topics::telemetry();
        for status in ["Downloading", "Updating"] {
            let mut report = PropertiesReport::default();
            report.ota.update_status = status.into();
            let payload = serde_json::to_vec(&report).unwrap();
            driver.dispatch(&telemetry, &payload).await;
        }
        let mut done = PropertiesReport::default();
        done.ota.update_status = "Done".into();
        done.versions.sensor_fw_version = "020100".into();
        let payload = serde_json::to_vec(&done).unwrap();
        driver.dispatch(&telemetry, &payload).await;

        run_handle.await.unwrap().unwrap();
        assert_eq!(device.snapshot().state.name(), "ready");
    }

    #[tokio::test]
    async fn failed_status_transitions_device_to_error() {
        let (device, _join) = ready_device().await;
        let channel = Arc::new(MockChannel::new());
        let (driver, _rx) = Driver::new(channel.clone(), &MqttConfig::default());
        let ctx = TaskContext::new(device.clone(), driver.clone() as Arc<dyn MqttPort>);
        let task = FirmwareTask::new(
            ctx,
            FirmwareSpec {
                module: FirmwareModule::SensorFw,
                desired_version: "020100".into(),
                package_uri: "http://x/fw.bin".into(),
                hash_value: "abc".into(),
            },
            Duration::from_secs(5),
        );

        let run_handle = tokio::spawn(async move { task.run(CancellationToken::new()).await });
        let _desired_state = channel.next_published().await.unwrap();

        let mut failed = PropertiesReport::default();
        failed.ota.update_status = "Failed".into();
        let payload = serde_json::to_vec(&failed).unwrap();
        driver.dispatch(&topics::telemetry(), &payload).await;

        let err = run_handle.await.unwrap().unwrap_err();
        assert_eq!(err.kind, Kind::ExternalFirmwareUpdateFailed);
        assert_eq!(device.snapshot().state.name(), "error");
    }
}
