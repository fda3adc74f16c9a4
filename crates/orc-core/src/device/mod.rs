//! The per-device state machine and its owner loop (§4.2, §5).
//!
//! A [`Device`] is mutated only by the task that owns it — its `run` loop.
//! External callers (routes, the task executor, the MQTT session) talk to a
//! cheaply-cloneable [`DeviceHandle`], which either sends a [`DeviceCommand`]
//! through the owner's inbox and awaits a oneshot reply, or reads the
//! latest [`DeviceSnapshot`] off a `watch` channel without touching the
//! inbox at all. No lock is ever taken on `Device` itself.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use orc_protocol::state::DeploymentManifest;
use orc_protocol::{
    ConnectionState, DeviceConnection, DeviceId, DeviceType, Kind, Notification, OrcError,
    OrcResult, PropertiesReport, State,
};

use crate::notifications::NotificationBus;

/// Which kind of deployment a `start_deploy` call targets. Unlike
/// `orc_protocol::TaskKind`, this has no `Config` variant: `ConfigTask` is
/// composite and its children each call `start_deploy` individually as they
/// run, so the device never needs to represent "deploying a config" as a
/// state of its own (§3's `State` enum has no such variant either).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployKind {
    App,
    Model,
    Firmware,
}

/// Read-only view of a device, published on every mutation so routes and
/// tasks never need to round-trip through the inbox just to look.
#[derive(Debug, Clone)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub name: String,
    pub device_type: DeviceType,
    pub state: State,
    pub connection_state: ConnectionState,
    pub properties: PropertiesReport,
}

enum DeviceCommand {
    Transition {
        new_state: State,
        reply: oneshot::Sender<()>,
    },
    StartDeploy {
        kind: DeployKind,
        manifest: DeploymentManifest,
        reply: oneshot::Sender<OrcResult<()>>,
    },
    MergeProperties {
        report: PropertiesReport,
        reply: oneshot::Sender<()>,
    },
    SetConnectionState {
        state: ConnectionState,
    },
    StartStreaming {
        reply: oneshot::Sender<OrcResult<()>>,
    },
    StopStreaming {
        reply: oneshot::Sender<OrcResult<()>>,
    },
    GuardDeploy {
        reply: oneshot::Sender<OrcResult<()>>,
    },
}

/// The owned, mutable device (§5: "no lock is needed on Device state").
pub struct Device {
    id: DeviceId,
    name: String,
    device_type: DeviceType,
    state: State,
    connection_state: ConnectionState,
    properties: PropertiesReport,
    notifications: NotificationBus,
    snapshot_tx: watch::Sender<DeviceSnapshot>,
}

impl Device {
    fn new(
        conn: &DeviceConnection,
        notifications: NotificationBus,
    ) -> (Self, watch::Receiver<DeviceSnapshot>) {
        let snapshot = DeviceSnapshot {
            id: conn.id,
            name: conn.name.clone(),
            device_type: conn.device_type,
            state: State::Uninitialized,
            connection_state: ConnectionState::Disconnected,
            properties: PropertiesReport::default(),
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(snapshot);
        (
            Device {
                id: conn.id,
                name: conn.name.clone(),
                device_type: conn.device_type,
                state: State::Uninitialized,
                connection_state: ConnectionState::Disconnected,
                properties: PropertiesReport::default(),
                notifications,
                snapshot_tx,
            },
            snapshot_rx,
        )
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// The single gatekeeper mutator of `Device.State` (§4.2): runs
    /// `on_exit`/`on_enter`, then publishes exactly one `state_changed`
    /// notification per call, in call order.
    pub fn transition(&mut self, new_state: State) {
        let from = self.state.name().to_string();
        self.on_exit();
        self.state = new_state;
        self.on_enter();
        let to = self.state.name().to_string();

        tracing::info!(device_id = %self.id, from = %from, to = %to, "device transition");
        self.notifications.publish(Notification::StateChanged {
            device_id: self.id,
            from,
            to,
            at: chrono::Utc::now(),
        });
        self.publish_snapshot();
    }

    fn on_exit(&mut self) {
        // No state currently owns resources that need releasing beyond the
        // manifest it carries, which is dropped along with the variant.
    }

    fn on_enter(&mut self) {}

    fn guard(&self, method: &str, allowed: &[&str]) -> OrcResult<()> {
        if allowed.contains(&self.state.name()) {
            Ok(())
        } else {
            Err(OrcError::invalid_method_during_state(
                method,
                self.state.name(),
            ))
        }
    }

    /// Only source of `InvalidStateForMethod` for deployment submission
    /// (§4.2): called by the task executor before it accepts a task for
    /// this device.
    fn guard_deploy(&self) -> OrcResult<()> {
        self.guard("start_deploy", &["ready"])
    }

    fn start_deploy(&mut self, kind: DeployKind, manifest: DeploymentManifest) -> OrcResult<()> {
        self.guard_deploy()?;
        let new_state = match kind {
            DeployKind::App => State::AppDeploying { manifest },
            DeployKind::Model => State::ModelDeploying { manifest },
            DeployKind::Firmware => State::FirmwareDeploying { manifest },
        };
        self.transition(new_state);
        Ok(())
    }

    fn start_streaming(&mut self) -> OrcResult<()> {
        self.guard("start_streaming", &["ready"])?;
        self.transition(State::Streaming);
        Ok(())
    }

    fn stop_streaming(&mut self) -> OrcResult<()> {
        self.guard("stop_streaming", &["streaming"])?;
        self.transition(State::Ready);
        Ok(())
    }

    /// Merge reported attributes (§3 `PropertiesReport` invariant). The
    /// first successful merge after a handshake brings a freshly-connected
    /// device from `Disconnected` to `Ready` (§4.2's transition table).
    fn merge_properties(&mut self, report: &PropertiesReport) {
        orc_protocol::properties::merge(&mut self.properties, report);

        if self.state.name() == "disconnected" && self.connection_state == ConnectionState::Connected {
            self.transition(State::Ready);
        } else {
            self.publish_snapshot();
        }
    }

    /// Driven by the MQTT session's `watch::Receiver<ConnectionState>`
    /// (§4.1, §4.2): a loss demotes the device to `Disconnected` regardless
    /// of its current state, per the "Any → Disconnected" transition.
    fn set_connection_state(&mut self, state: ConnectionState) {
        self.connection_state = state;
        if state == ConnectionState::Disconnected && self.state.name() != "disconnected" {
            self.transition(State::Disconnected);
        } else {
            self.publish_snapshot();
        }
    }

    fn publish_snapshot(&self) {
        let _ = self.snapshot_tx.send(DeviceSnapshot {
            id: self.id,
            name: self.name.clone(),
            device_type: self.device_type,
            state: self.state.clone(),
            connection_state: self.connection_state,
            properties: self.properties.clone(),
        });
    }
}

/// Cheaply-cloneable front for a running device's owner loop.
#[derive(Clone)]
pub struct DeviceHandle {
    id: DeviceId,
    device_type: DeviceType,
    inbox: mpsc::Sender<DeviceCommand>,
    snapshot: watch::Receiver<DeviceSnapshot>,
}

impl DeviceHandle {
    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Latest published snapshot — never blocks, never touches the inbox.
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<DeviceSnapshot> {
        self.snapshot.clone()
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> DeviceCommand,
    ) -> OrcResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inbox
            .send(build(reply_tx))
            .await
            .map_err(|_| gone(self.id))?;
        reply_rx.await.map_err(|_| gone(self.id))
    }

    pub async fn transition(&self, new_state: State) -> OrcResult<()> {
        self.call(|reply| DeviceCommand::Transition { new_state, reply })
            .await
    }

    pub async fn start_deploy(&self, kind: DeployKind, manifest: DeploymentManifest) -> OrcResult<()> {
        self.call(|reply| DeviceCommand::StartDeploy {
            kind,
            manifest,
            reply,
        })
        .await?
    }

    pub async fn guard_deploy(&self) -> OrcResult<()> {
        self.call(|reply| DeviceCommand::GuardDeploy { reply }).await?
    }

    pub async fn merge_properties(&self, report: PropertiesReport) -> OrcResult<()> {
        self.call(|reply| DeviceCommand::MergeProperties { report, reply })
            .await
    }

    pub async fn set_connection_state(&self, state: ConnectionState) {
        let _ = self.inbox.send(DeviceCommand::SetConnectionState { state }).await;
    }

    pub async fn start_streaming(&self) -> OrcResult<()> {
        self.call(|reply| DeviceCommand::StartStreaming { reply }).await?
    }

    pub async fn stop_streaming(&self) -> OrcResult<()> {
        self.call(|reply| DeviceCommand::StopStreaming { reply }).await?
    }
}

fn gone(id: DeviceId) -> OrcError {
    OrcError::new(
        Kind::InternalInvariantViolation,
        format!("device {id}'s owner loop is gone"),
    )
}

/// Spawn a device's owner loop and return a handle to it plus the loop's
/// `JoinHandle` (the caller decides whether to await it, e.g. on shutdown).
pub fn spawn(conn: &DeviceConnection, notifications: NotificationBus) -> (DeviceHandle, JoinHandle<()>) {
    let (device, snapshot_rx) = Device::new(conn, notifications);
    let (inbox_tx, inbox_rx) = mpsc::channel(64);
    let handle = DeviceHandle {
        id: device.id(),
        device_type: device.device_type,
        inbox: inbox_tx,
        snapshot: snapshot_rx,
    };
    let join = tokio::spawn(run(device, inbox_rx));
    (handle, join)
}

async fn run(mut device: Device, mut inbox: mpsc::Receiver<DeviceCommand>) {
    while let Some(cmd) = inbox.recv().await {
        match cmd {
            DeviceCommand::Transition { new_state, reply } => {
                device.transition(new_state);
                let _ = reply.send(());
            }
            DeviceCommand::StartDeploy {
                kind,
                manifest,
                reply,
            } => {
                let _ = reply.send(device.start_deploy(kind, manifest));
            }
            DeviceCommand::GuardDeploy { reply } => {
                let _ = reply.send(device.guard_deploy());
            }
            DeviceCommand::MergeProperties { report, reply } => {
                device.merge_properties(&report);
                let _ = reply.send(());
            }
            DeviceCommand::SetConnectionState { state } => {
                device.set_connection_state(state);
            }
            DeviceCommand::StartStreaming { reply } => {
                let _ = reply.send(device.start_streaming());
            }
            DeviceCommand::StopStreaming { reply } => {
                let _ = reply.send(device.stop_streaming());
            }
        }
    }
    tracing::info!("device owner loop exiting, inbox closed");
}

/// Handshake liveness bookkeeping for a device's `ConnectionState` demotion
/// after consecutive failures (§4.1: "three consecutive failures demote
/// `ConnectionState` to Disconnected").
pub const HANDSHAKE_FAILURE_THRESHOLD: u32 = 3;

/// Default interval between handshake pings, kept here (not just in
/// `orc-mqtt`) since `orc-core` owns the decision of when a device is
/// considered stale for REST reporting purposes too.
pub const HANDSHAKE_INTERVAL: Duration = Duration::from_secs(60);
