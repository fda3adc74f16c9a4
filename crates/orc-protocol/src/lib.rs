//! Shared wire types, topic builders and codecs for the device orchestrator.
//!
//! No I/O lives here — only the shapes and pure functions that `orc-mqtt`,
//! `orc-core` and `orc-artifacts` all need to agree on.

pub mod aot;
pub mod device;
pub mod error;
pub mod model_package;
pub mod notification;
pub mod pagination;
pub mod properties;
pub mod qr;
pub mod rpc;
pub mod state;
pub mod task;
pub mod topics;

pub use device::{ConnectionState, DeviceConnection, DeviceId, DeviceType};
pub use error::{Kind, OrcError, OrcResult};
pub use notification::Notification;
pub use properties::{Hardware, OtaStatus, PropertiesReport, Versions};
pub use state::{DeploymentManifest, State};
pub use task::{DeployHistoryEntry, TaskId, TaskKind, TaskState, TaskStatus};
