//! `Notification` — the closed, tagged variant broadcast by the
//! Notification Bus (§3, §4.6, §9). Serialized as `{kind, data}` on the
//! wire so WebSocket consumers see exactly the shape §3 describes, while
//! the Rust side keeps a closed, statically-typed set of variants instead
//! of a loose `{kind: String, data: Value}` pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::DeviceId;
use crate::task::{TaskKind, TaskStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Notification {
    StateChanged {
        device_id: DeviceId,
        from: String,
        to: String,
        at: DateTime<Utc>,
    },
    TaskStarted {
        device_id: DeviceId,
        task_kind: TaskKind,
        task_id: String,
        at: DateTime<Utc>,
    },
    TaskFinished {
        device_id: DeviceId,
        task_kind: TaskKind,
        task_id: String,
        status: TaskStatus,
        error: Option<String>,
        at: DateTime<Utc>,
    },
    ArtifactGrouped {
        device_id: DeviceId,
        stem: String,
        image_path: Option<String>,
        metadata_path: Option<String>,
        at: DateTime<Utc>,
    },
    ArtifactEvicted {
        device_id: DeviceId,
        stem: String,
        at: DateTime<Utc>,
    },
    StorageQuotaExceeded {
        device_id: DeviceId,
        used_bytes: u64,
        quota_bytes: u64,
        at: DateTime<Utc>,
    },
    DeviceHandshakeFailed {
        device_id: DeviceId,
        consecutive_failures: u32,
        at: DateTime<Utc>,
    },
}
