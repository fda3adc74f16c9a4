//! Artifact ingestion webserver (§4.5): receives per-device image and
//! inference-metadata uploads over HTTP, pairs them into groups, enforces
//! per-device storage quotas and serves back directory listings, images,
//! the live preview frame and paginated inference-result metadata.
//!
//! Deliberately depends only on `orc-protocol`, not `orc-core` — the
//! daemon binary is the only place that needs both, so keeping this crate
//! one-directional avoids a cycle.

pub mod error;
pub mod file_grouping;
pub mod preview;
pub mod server;
pub mod state;
pub mod storage_watcher;

pub use error::{ApiError, ApiResult};
pub use file_grouping::{FileGroup, FileGroupingError, FileGrouping};
pub use preview::PreviewStore;
pub use server::build_router;
pub use state::{ArtifactState, DeviceArtifacts};
pub use storage_watcher::{StorageSizeWatcher, StorageWatcherError};
