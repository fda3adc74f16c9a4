//! `FileGrouping` (§4.5): pairs an arriving `Images/<stem>.jpg` with its
//! `Metadata/<stem>.txt` sibling, emitting completed groups in arrival
//! order. A small FIFO — not a full index — since a device only ever has
//! one or two groups outstanding at a time in practice (the pairing window
//! is a handful of seconds, not a backlog).

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

pub const IMAGE_FOLDER: &str = "Images";
pub const METADATA_FOLDER: &str = "Metadata";
pub const IMAGE_EXT: &str = "jpg";
pub const METADATA_EXT: &str = "txt";

/// Default retention window before an incomplete group is evicted. The
/// spec names no exact figure (§4.5: "Groups not completed within a
/// retention window are evicted") — 30s gives a slow-arriving sibling
/// several telemetry cycles to show up without letting the FIFO grow
/// unbounded.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, thiserror::Error)]
pub enum FileGroupingError {
    #[error("unknown parent folder: {0}")]
    UnknownParent(String),
}

/// One completed (or evicted) pairing. `None` on a side means that side
/// never arrived before eviction (§4.5: "emitted with missing sides as
/// `None`").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileGroup {
    pub stem: String,
    pub image_path: Option<PathBuf>,
    pub metadata_path: Option<PathBuf>,
}

struct PendingGroup {
    stem: String,
    image_path: Option<PathBuf>,
    metadata_path: Option<PathBuf>,
    registered_at: Instant,
}

impl PendingGroup {
    fn complete(&self) -> bool {
        self.image_path.is_some() && self.metadata_path.is_some()
    }

    fn into_group(self) -> FileGroup {
        FileGroup {
            stem: self.stem,
            image_path: self.image_path,
            metadata_path: self.metadata_path,
        }
    }
}

/// FIFO of in-flight groups for one device. Completed groups are removed
/// and returned immediately from `register`; `evict_expired` sweeps
/// whatever is left past `retention`.
pub struct FileGrouping {
    retention: Duration,
    pending: Mutex<VecDeque<PendingGroup>>,
}

impl FileGrouping {
    pub fn new(retention: Duration) -> Self {
        FileGrouping {
            retention,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Register a file that just landed under `parent` (one of
    /// `Images`/`Metadata`) with the given `stem` and `path`. Returns the
    /// completed group if this was the second side to arrive.
    pub async fn register(
        &self,
        parent: &str,
        stem: &str,
        path: PathBuf,
    ) -> Result<Option<FileGroup>, FileGroupingError> {
        let is_image = match parent {
            IMAGE_FOLDER => true,
            METADATA_FOLDER => false,
            other => return Err(FileGroupingError::UnknownParent(other.to_string())),
        };

        let mut pending = self.pending.lock().await;
        if let Some(existing) = pending.iter_mut().find(|g| g.stem == stem) {
            if is_image {
                existing.image_path = Some(path);
            } else {
                existing.metadata_path = Some(path);
            }
            if existing.complete() {
                let idx = pending.iter().position(|g| g.stem == stem).unwrap();
                let group = pending.remove(idx).unwrap();
                return Ok(Some(group.into_group()));
            }
            return Ok(None);
        }

        let mut group = PendingGroup {
            stem: stem.to_string(),
            image_path: None,
            metadata_path: None,
            registered_at: Instant::now(),
        };
        if is_image {
            group.image_path = Some(path);
        } else {
            group.metadata_path = Some(path);
        }
        pending.push_back(group);
        Ok(None)
    }

    /// Sweep groups older than the retention window, returning each as a
    /// `FileGroup` with whichever side never arrived left `None` (§4.5,
    /// §8 scenario 4).
    pub async fn evict_expired(&self) -> Vec<FileGroup> {
        let now = Instant::now();
        let mut pending = self.pending.lock().await;
        let mut expired = Vec::new();
        let mut i = 0;
        while i < pending.len() {
            if now.duration_since(pending[i].registered_at) >= self.retention {
                expired.push(pending.remove(i).unwrap());
            } else {
                i += 1;
            }
        }
        expired.into_iter().map(PendingGroup::into_group).collect()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pairs_image_then_metadata() {
        let grouping = FileGrouping::new(DEFAULT_RETENTION);
        assert!(grouping
            .register(IMAGE_FOLDER, "0001", PathBuf::from("Images/0001.jpg"))
            .await
            .unwrap()
            .is_none());

        let group = grouping
            .register(METADATA_FOLDER, "0001", PathBuf::from("Metadata/0001.txt"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(group.stem, "0001");
        assert_eq!(group.image_path, Some(PathBuf::from("Images/0001.jpg")));
        assert_eq!(group.metadata_path, Some(PathBuf::from("Metadata/0001.txt")));
    }

    #[tokio::test]
    async fn pairs_metadata_then_image_identically() {
        let grouping = FileGrouping::new(DEFAULT_RETENTION);
        assert!(grouping
            .register(METADATA_FOLDER, "0002", PathBuf::from("Metadata/0002.txt"))
            .await
            .unwrap()
            .is_none());

        let group = grouping
            .register(IMAGE_FOLDER, "0002", PathBuf::from("Images/0002.jpg"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(group.image_path, Some(PathBuf::from("Images/0002.jpg")));
        assert_eq!(group.metadata_path, Some(PathBuf::from("Metadata/0002.txt")));
    }

    #[tokio::test]
    async fn lone_metadata_does_not_emit() {
        let grouping = FileGrouping::new(DEFAULT_RETENTION);
        let outcome = grouping
            .register(METADATA_FOLDER, "0003", PathBuf::from("Metadata/0003.txt"))
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert_eq!(grouping.pending_count().await, 1);
    }

    #[tokio::test]
    async fn unknown_parent_is_rejected() {
        let grouping = FileGrouping::new(DEFAULT_RETENTION);
        let err = grouping
            .register("Thumbnails", "0001", PathBuf::from("Thumbnails/0001.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, FileGroupingError::UnknownParent(_)));
    }

    #[tokio::test]
    async fn eviction_after_retention_returns_missing_side_as_none() {
        let grouping = FileGrouping::new(Duration::from_millis(10));
        grouping
            .register(IMAGE_FOLDER, "0004", PathBuf::from("Images/0004.jpg"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        let evicted = grouping.evict_expired().await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].stem, "0004");
        assert_eq!(evicted[0].image_path, Some(PathBuf::from("Images/0004.jpg")));
        assert!(evicted[0].metadata_path.is_none());
        assert_eq!(grouping.pending_count().await, 0);
    }
}
