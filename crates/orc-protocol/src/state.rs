//! The device `State` tagged variant (§3, §4.2). Exactly one state is ever
//! active; transitions go through the single gatekeeper in `orc-core`.

use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// A manifest describing an in-flight App/Model/Firmware deployment, carried
/// by the corresponding `*Deploying` state (§3: "AppDeploying carries a
/// `DeploymentManifest` and a completion signal").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentManifest {
    pub task_id: TaskId,
    pub description: String,
}

/// Device application state. Each variant names the `transition()` targets
/// reachable from it — see §4.2's non-exhaustive transition table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum State {
    /// Before the first MQTT session attempt.
    Uninitialized,
    /// MQTT session lost or never established.
    Disconnected,
    /// Connected and idle; the only state deployments and streaming may
    /// start from.
    Ready,
    AppDeploying { manifest: DeploymentManifest },
    ModelDeploying { manifest: DeploymentManifest },
    FirmwareDeploying { manifest: DeploymentManifest },
    Streaming,
    Error { reason: String },
}

impl State {
    /// Short, stable name used in logs and notifications.
    pub fn name(&self) -> &'static str {
        match self {
            State::Uninitialized => "uninitialized",
            State::Disconnected => "disconnected",
            State::Ready => "ready",
            State::AppDeploying { .. } => "app_deploying",
            State::ModelDeploying { .. } => "model_deploying",
            State::FirmwareDeploying { .. } => "firmware_deploying",
            State::Streaming => "streaming",
            State::Error { .. } => "error",
        }
    }

    pub fn is_deploying(&self) -> bool {
        matches!(
            self,
            State::AppDeploying { .. } | State::ModelDeploying { .. } | State::FirmwareDeploying { .. }
        )
    }
}
