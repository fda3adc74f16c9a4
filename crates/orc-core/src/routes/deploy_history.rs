//! `GET /deploy_history?device_id&limit&starting_after` (§6): paginated
//! read-only view over `DeployHistory`, whose in-memory-only retention is a
//! spec `Non-goal` (persistent task history beyond in-memory state).

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use orc_protocol::pagination::Page;
use orc_protocol::{DeployHistoryEntry, DeviceId};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DeployHistoryQuery {
    #[serde(default)]
    pub device_id: Option<DeviceId>,
    #[serde(default)]
    pub starting_after: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn list_deploy_history(
    State(state): State<AppState>,
    Query(q): Query<DeployHistoryQuery>,
) -> Json<Page<DeployHistoryEntry>> {
    Json(
        state
            .history
            .list(q.device_id, q.starting_after.as_deref(), q.limit),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::build_router;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use orc_protocol::{DeployHistoryEntry, TaskKind, TaskStatus};
    use tower::ServiceExt;

    #[tokio::test]
    async fn empty_history_returns_empty_page() {
        let state = crate::state::test_state();
        let router = build_router(state);
        let response = router
            .oneshot(Request::get("/deploy_history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let page: Page<DeployHistoryEntry> = serde_json::from_slice(&body).unwrap();
        assert!(page.items.is_empty());
        assert!(page.continuation_token.is_none());
    }

    #[tokio::test]
    async fn filters_by_device_id() {
        let state = crate::state::test_state();
        state.history.record(DeployHistoryEntry {
            deploy_id: "d1".into(),
            config_id: None,
            started_at: chrono::Utc::now(),
            task_kind: TaskKind::Firmware,
            device_id: DeviceId(1883),
            status: TaskStatus::Success,
            error: None,
        });
        state.history.record(DeployHistoryEntry {
            deploy_id: "d2".into(),
            config_id: None,
            started_at: chrono::Utc::now(),
            task_kind: TaskKind::Model,
            device_id: DeviceId(1884),
            status: TaskStatus::Success,
            error: None,
        });
        let router = build_router(state);
        let response = router
            .oneshot(
                Request::get("/deploy_history?device_id=1883")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let page: Page<DeployHistoryEntry> = serde_json::from_slice(&body).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].deploy_id, "d1");
    }
}
