//! Deployment task identity and status (§3, §9). The concrete task bodies
//! (`AppTask`, `ModelTask`, `FirmwareTask`, `ConfigTask`) live in `orc-core`;
//! this crate only carries the wire-visible shapes.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::DeviceId;

/// Which kind of deployment a task performs. A closed set (§9: "use a
/// closed tagged variant `{App, Model, Firmware, Config}`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    App,
    Model,
    Firmware,
    Config,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::App => "app",
            TaskKind::Model => "model",
            TaskKind::Firmware => "firmware",
            TaskKind::Config => "config",
        };
        write!(f, "{s}")
    }
}

/// Derived from `kind + device_id`, making a second task of the same kind
/// for the same device impossible to have outstanding at once (§3, §4.3 —
/// coalescing key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(kind: impl fmt::Display, device_id: DeviceId) -> Self {
        TaskId(format!("{kind}_task_for_device_{device_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a task (named `Status` in the original; `Running`
/// here replaces `Deploying` and `Error` replaces `Fail` to match this
/// spec's own wording in §3/§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Initializing,
    Running,
    Success,
    Error,
}

impl TaskStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Error)
    }
}

/// Mutable status record carried by every task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl TaskState {
    pub fn new() -> Self {
        TaskState {
            status: TaskStatus::Initializing,
            started_at: Utc::now(),
            error: None,
        }
    }

    pub fn set(&mut self, status: TaskStatus) {
        if self.status.is_finished() {
            // A finished task state does not regress — matches the
            // original's "update while already finished" no-op-with-log
            // behavior.
            return;
        }
        self.status = status;
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.status.is_finished() {
            return;
        }
        self.status = TaskStatus::Error;
        if self.error.is_none() {
            self.error = Some(reason.into());
        }
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::new()
    }
}

/// Default timeout for a deployment task's outer bound (§5: "Tasks set
/// their own deadlines").
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(120);

/// A single append-only entry in `DeployHistory` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployHistoryEntry {
    pub deploy_id: String,
    pub config_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub task_kind: TaskKind,
    pub device_id: DeviceId,
    pub status: TaskStatus,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_is_derived_from_kind_and_device() {
        let id = TaskId::new(TaskKind::Model, DeviceId(1883));
        assert_eq!(id.as_str(), "model_task_for_device_1883");
    }

    #[test]
    fn task_id_equality_makes_duplicates_detectable() {
        let a = TaskId::new(TaskKind::App, DeviceId(42));
        let b = TaskId::new(TaskKind::App, DeviceId(42));
        assert_eq!(a, b);
    }

    #[test]
    fn task_state_does_not_regress_once_finished() {
        let mut state = TaskState::new();
        state.set(TaskStatus::Success);
        state.set(TaskStatus::Running);
        assert_eq!(state.status, TaskStatus::Success);
    }

    #[test]
    fn task_state_fail_sets_error_once() {
        let mut state = TaskState::new();
        state.fail("first error");
        state.fail("second error");
        assert_eq!(state.error, Some("first error".to_string()));
        assert_eq!(state.status, TaskStatus::Error);
    }

    #[test]
    fn task_status_is_finished() {
        assert!(TaskStatus::Success.is_finished());
        assert!(TaskStatus::Error.is_finished());
        assert!(!TaskStatus::Running.is_finished());
        assert!(!TaskStatus::Initializing.is_finished());
    }
}
