//! Append-only deployment history (§4.5), queryable with the same
//! cursor-pagination contract as the REST catalog endpoints.

use std::sync::Mutex;

use orc_protocol::pagination::{clamp_limit, paginate, Page};
use orc_protocol::{DeployHistoryEntry, DeviceId};

#[derive(Default)]
pub struct DeployHistory {
    entries: Mutex<Vec<DeployHistoryEntry>>,
}

impl DeployHistory {
    pub fn new() -> Self {
        DeployHistory::default()
    }

    pub fn record(&self, entry: DeployHistoryEntry) {
        self.entries.lock().unwrap().push(entry);
    }

    /// Most recent first, paginated by `deploy_id`.
    pub fn list(
        &self,
        device_id: Option<DeviceId>,
        starting_after: Option<&str>,
        limit: Option<usize>,
    ) -> Page<DeployHistoryEntry> {
        let mut entries: Vec<DeployHistoryEntry> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| device_id.map(|id| e.device_id == id).unwrap_or(true))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        let starting_after = starting_after.map(|s| s.to_string());
        paginate(
            &entries,
            |e| e.deploy_id.clone(),
            starting_after.as_ref(),
            clamp_limit(limit),
        )
    }
}
