//! `StorageSizeWatcher` (§4.5, §5): tracks bytes written per device and
//! enforces the configured quota, deleting the oldest files first when
//! `auto_deletion` is enabled. Runs as a background poll loop bounded by
//! `POLL_INTERVAL` and `ABSOLUTE_BUDGET` so a misbehaving disk can't wedge
//! the whole ingestion server on deletion work.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use orc_protocol::{DeviceId, Notification};

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const ABSOLUTE_BUDGET: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageWatcherError {
    #[error("quota exceeded for device {device_id:?}: {used} > {quota} bytes, auto-deletion disabled")]
    QuotaExceeded { device_id: DeviceId, used: u64, quota: u64 },
    #[error("filesystem error: {0}")]
    Io(String),
}

#[derive(Clone, Copy)]
struct TrackedFile {
    size: u64,
    recorded_at: DateTime<Utc>,
}

/// Per-device byte ledger. One instance is shared by the watcher's poll
/// loop and the ingestion server's write handler.
pub struct StorageSizeWatcher {
    device_id: DeviceId,
    data_root: PathBuf,
    quota_bytes: u64,
    auto_deletion: bool,
    tracked: Mutex<HashMap<PathBuf, TrackedFile>>,
    on_notification: Arc<dyn Fn(Notification) + Send + Sync>,
}

impl StorageSizeWatcher {
    pub fn new(
        device_id: DeviceId,
        data_root: PathBuf,
        quota_bytes: u64,
        auto_deletion: bool,
        on_notification: Arc<dyn Fn(Notification) + Send + Sync>,
    ) -> Self {
        StorageSizeWatcher {
            device_id,
            data_root,
            quota_bytes,
            auto_deletion,
            tracked: Mutex::new(HashMap::new()),
            on_notification,
        }
    }

    /// Records a just-written file so `total_bytes` and `enforce` see it
    /// without waiting for the next `rescan`.
    pub async fn record_arrival(&self, path: PathBuf, size: u64) {
        self.tracked.lock().await.insert(
            path,
            TrackedFile {
                size,
                recorded_at: Utc::now(),
            },
        );
    }

    pub async fn total_bytes(&self) -> u64 {
        self.tracked.lock().await.values().map(|f| f.size).sum()
    }

    /// Walks `data_root`, reconciling the in-memory ledger against what is
    /// actually on disk: files removed externally (e.g. by an operator) are
    /// dropped from the ledger, files found but never recorded are added.
    pub async fn rescan(&self) -> Result<(), StorageWatcherError> {
        let mut on_disk = HashMap::new();
        walk(&self.data_root, &mut on_disk).map_err(|e| StorageWatcherError::Io(e.to_string()))?;

        let mut tracked = self.tracked.lock().await;
        tracked.retain(|path, _| on_disk.contains_key(path));
        for (path, size) in on_disk {
            tracked.entry(path).or_insert(TrackedFile {
                size,
                recorded_at: Utc::now(),
            });
        }
        Ok(())
    }

    /// Deletes oldest-first until back under quota. Errors rather than
    /// deleting when `auto_deletion` is off, publishing
    /// `StorageQuotaExceeded` either way so an operator is informed.
    pub async fn enforce(&self) -> Result<Vec<PathBuf>, StorageWatcherError> {
        let mut tracked = self.tracked.lock().await;
        let total: u64 = tracked.values().map(|f| f.size).sum();
        if total <= self.quota_bytes {
            return Ok(Vec::new());
        }

        (self.on_notification)(Notification::StorageQuotaExceeded {
            device_id: self.device_id,
            used_bytes: total,
            quota_bytes: self.quota_bytes,
            at: Utc::now(),
        });

        if !self.auto_deletion {
            return Err(StorageWatcherError::QuotaExceeded {
                device_id: self.device_id,
                used: total,
                quota: self.quota_bytes,
            });
        }

        let mut entries: Vec<(PathBuf, TrackedFile)> =
            tracked.iter().map(|(p, f)| (p.clone(), *f)).collect();
        entries.sort_by_key(|(_, f)| f.recorded_at);

        let mut running = total;
        let mut deleted = Vec::new();
        for (path, file) in entries {
            if running <= self.quota_bytes {
                break;
            }
            if tokio::fs::remove_file(&path).await.is_ok() {
                running -= file.size;
                tracked.remove(&path);
                deleted.push(path);
            }
        }
        Ok(deleted)
    }

    /// Background loop: rescan and enforce every [`POLL_INTERVAL`], with
    /// the whole cycle's deletion work bounded by [`ABSOLUTE_BUDGET`] so a
    /// large backlog can't starve the ingestion server's request handling.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        loop {
            ticker.tick().await;
            let outcome = tokio::time::timeout(ABSOLUTE_BUDGET, async {
                if let Err(err) = self.rescan().await {
                    tracing::warn!(device_id = ?self.device_id, %err, "storage rescan failed");
                }
                if let Err(err) = self.enforce().await {
                    tracing::warn!(device_id = ?self.device_id, %err, "storage enforcement failed");
                }
            })
            .await;
            if outcome.is_err() {
                tracing::warn!(device_id = ?self.device_id, "storage enforcement exceeded absolute budget");
            }
        }
    }
}

fn walk(root: &Path, out: &mut HashMap<PathBuf, u64>) -> std::io::Result<()> {
    if !root.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            walk(&path, out)?;
        } else {
            out.insert(path, metadata.len());
        }
    }
    Ok(())
}
