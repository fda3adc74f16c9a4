//! Artifact ingestion HTTP server (§4.5, §6): accepts per-device file
//! uploads, pairs `Images`/`Metadata` siblings, serves back directory
//! listings, individual images, the live preview frame and paginated
//! inference-result metadata.

use std::path::PathBuf;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use orc_protocol::pagination::{paginate, Page};
use orc_protocol::{DeviceId, Notification, OrcError};

use crate::error::{ApiError, ApiResult};
use crate::state::ArtifactState;

pub fn build_router(state: ArtifactState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/{device_id}/{*rest}", put(ingest))
        .route("/images/devices/{device_id}/directories", get(list_directories))
        .route("/images/devices/{device_id}/image/{name}", get(get_image))
        .route("/images/devices/{device_id}/preview", get(get_preview))
        .route(
            "/inferenceresults/devices/{device_id}/json",
            get(list_inference_results),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

/// Splits `Images/0001.jpg` into `("Images", "0001")`. Anything not
/// matching `<Folder>/<stem>.<ext>` is accepted onto disk (the device may
/// write other files) but produces no grouping/preview side effect.
fn parent_and_stem(rest: &str) -> Option<(&str, &str)> {
    let mut parts = rest.splitn(2, '/');
    let folder = parts.next()?;
    let filename = parts.next()?;
    let stem = filename.rsplit_once('.').map(|(s, _)| s).unwrap_or(filename);
    Some((folder, stem))
}

async fn ingest(
    State(state): State<ArtifactState>,
    Path((device_id, rest)): Path<(DeviceId, String)>,
    body: axum::body::Bytes,
) -> ApiResult<StatusCode> {
    let device = state
        .device(device_id)
        .ok_or_else(|| OrcError::device_not_found(device_id))?
        .clone();

    let target = device.data_root.join(&rest);
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| OrcError::new(orc_protocol::Kind::InternalInvariantViolation, e.to_string()))?;
    }
    let tmp_path = target.with_extension("tmp");
    tokio::fs::write(&tmp_path, &body)
        .await
        .map_err(|e| OrcError::new(orc_protocol::Kind::InternalInvariantViolation, e.to_string()))?;
    tokio::fs::rename(&tmp_path, &target)
        .await
        .map_err(|e| OrcError::new(orc_protocol::Kind::InternalInvariantViolation, e.to_string()))?;

    device.watcher.record_arrival(target.clone(), body.len() as u64).await;

    // Grouping, preview and quota side effects are best-effort: a failure
    // here is logged, never turned into a non-2xx response for the device
    // that just successfully wrote its file.
    if let Some((folder, stem)) = parent_and_stem(&rest) {
        if folder == crate::file_grouping::IMAGE_FOLDER && rest.ends_with(crate::file_grouping::IMAGE_EXT) {
            state.preview.set_frame(device_id, body.clone()).await;
        }
        match device.grouping.register(folder, stem, target).await {
            Ok(Some(group)) => {
                (state.on_notification)(Notification::ArtifactGrouped {
                    device_id,
                    stem: group.stem,
                    image_path: group.image_path.map(|p| p.display().to_string()),
                    metadata_path: group.metadata_path.map(|p| p.display().to_string()),
                    at: Utc::now(),
                });
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(device_id = ?device_id, %err, "file grouping rejected upload path");
            }
        }
    }

    if let Err(err) = device.watcher.enforce().await {
        tracing::warn!(device_id = ?device_id, %err, "storage quota enforcement failed after ingest");
    }

    Ok(StatusCode::CREATED)
}

#[derive(Debug, Serialize)]
struct DirectoryListing {
    entries: Vec<String>,
}

async fn list_directories(
    State(state): State<ArtifactState>,
    Path(device_id): Path<DeviceId>,
) -> ApiResult<Json<DirectoryListing>> {
    let device = state
        .device(device_id)
        .ok_or_else(|| OrcError::device_not_found(device_id))?;

    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(&device.data_root)
        .await
        .map_err(|_| OrcError::file_not_found(device.data_root.display().to_string()))?;
    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| OrcError::new(orc_protocol::Kind::InternalInvariantViolation, e.to_string()))?
    {
        entries.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(Json(DirectoryListing { entries }))
}

async fn get_image(
    State(state): State<ArtifactState>,
    Path((device_id, name)): Path<(DeviceId, String)>,
) -> ApiResult<Vec<u8>> {
    let device = state
        .device(device_id)
        .ok_or_else(|| OrcError::device_not_found(device_id))?;
    let path: PathBuf = device.data_root.join(crate::file_grouping::IMAGE_FOLDER).join(&name);
    tokio::fs::read(&path)
        .await
        .map_err(|_| OrcError::file_not_found(path.display().to_string()).into())
}

async fn get_preview(
    State(state): State<ArtifactState>,
    Path(device_id): Path<DeviceId>,
) -> ApiResult<Vec<u8>> {
    state
        .preview
        .frame(device_id)
        .await
        .map(|b| b.to_vec())
        .ok_or_else(|| OrcError::file_not_found("preview frame").into())
}

#[derive(Debug, Deserialize)]
struct InferenceResultsQuery {
    #[serde(default)]
    starting_after: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
struct InferenceResultEntry {
    stem: String,
    metadata_path: String,
}

async fn list_inference_results(
    State(state): State<ArtifactState>,
    Path(device_id): Path<DeviceId>,
    Query(q): Query<InferenceResultsQuery>,
) -> ApiResult<Json<Page<InferenceResultEntry>>> {
    let device = state
        .device(device_id)
        .ok_or_else(|| OrcError::device_not_found(device_id))?;

    let metadata_root = device.data_root.join(crate::file_grouping::METADATA_FOLDER);
    let mut entries = Vec::new();
    if let Ok(mut read_dir) = tokio::fs::read_dir(&metadata_root).await {
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(crate::file_grouping::METADATA_EXT) {
                let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
                entries.push(InferenceResultEntry {
                    stem,
                    metadata_path: path.display().to_string(),
                });
            }
        }
    }
    entries.sort_by(|a, b| a.stem.cmp(&b.stem));

    let limit = orc_protocol::pagination::clamp_limit(q.limit);
    let page = paginate(&entries, |e| e.stem.clone(), q.starting_after.as_ref(), limit);
    Ok(Json(page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn ingest_unknown_device_is_404() {
        let state = crate::state::test_state(DeviceId(1883), PathBuf::from("/tmp/nope"));
        let router = build_router(state);
        let response = router
            .oneshot(
                Request::put("/9999/Images/0001.jpg")
                    .body(Body::from(vec![1, 2, 3]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ingest_writes_file_and_pairs_group() {
        let dir = tempfile::tempdir().unwrap();
        let state = crate::state::test_state(DeviceId(1883), dir.path().to_path_buf());
        let router = build_router(state);

        let response = router
            .clone()
            .oneshot(
                Request::put("/1883/Images/0001.jpg")
                    .body(Body::from(vec![0xff, 0xd8]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = router
            .oneshot(
                Request::put("/1883/Metadata/0001.txt")
                    .body(Body::from("result"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        assert!(dir.path().join("Images/0001.jpg").exists());
        assert!(dir.path().join("Metadata/0001.txt").exists());
    }

    #[tokio::test]
    async fn preview_is_empty_before_any_image_arrives() {
        let dir = tempfile::tempdir().unwrap();
        let state = crate::state::test_state(DeviceId(1883), dir.path().to_path_buf());
        let router = build_router(state);
        let response = router
            .oneshot(
                Request::get("/images/devices/1883/preview")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn preview_returns_last_uploaded_image() {
        let dir = tempfile::tempdir().unwrap();
        let state = crate::state::test_state(DeviceId(1883), dir.path().to_path_buf());
        let router = build_router(state);

        router
            .clone()
            .oneshot(
                Request::put("/1883/Images/0001.jpg")
                    .body(Body::from(vec![0xff, 0xd8, 0xff]))
                    .unwrap(),
            )
            .await
            .unwrap();

        let response = router
            .oneshot(
                Request::get("/images/devices/1883/preview")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), &[0xff, 0xd8, 0xff]);
    }

    #[tokio::test]
    async fn inference_results_empty_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let state = crate::state::test_state(DeviceId(1883), dir.path().to_path_buf());
        let router = build_router(state);
        let response = router
            .oneshot(
                Request::get("/inferenceresults/devices/1883/json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let page: Page<InferenceResultEntry> = serde_json::from_slice(&body).unwrap();
        assert!(page.items.is_empty());
    }
}
