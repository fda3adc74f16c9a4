//! `GET/POST /devices`, `GET/DELETE /devices/{id}` (§6).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use orc_protocol::{ConnectionState, DeviceConnection, DeviceId, DeviceType, OrcError, State as DeviceState};

use crate::device;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Flat summary view of a device's live snapshot, for list/get responses.
#[derive(Debug, Serialize)]
pub struct DeviceView {
    pub id: DeviceId,
    pub name: String,
    pub device_type: DeviceType,
    pub state: String,
    pub connection_state: ConnectionState,
}

impl From<device::DeviceSnapshot> for DeviceView {
    fn from(snap: device::DeviceSnapshot) -> Self {
        DeviceView {
            id: snap.id,
            name: snap.name,
            device_type: snap.device_type,
            state: snap.state.name().to_string(),
            connection_state: snap.connection_state,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddDeviceRequest {
    pub id: DeviceId,
    pub name: String,
    #[serde(default)]
    pub device_type: DeviceType,
    pub data_root: std::path::PathBuf,
    #[serde(default)]
    pub quota_bytes: Option<u64>,
    #[serde(default)]
    pub auto_deletion: bool,
}

pub async fn list_devices(State(state): State<AppState>) -> Json<Vec<DeviceView>> {
    let mut views = Vec::new();
    for handle in state.registry.list().await {
        views.push(handle.snapshot().into());
    }
    Json(views)
}

pub async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<u16>,
) -> ApiResult<Json<DeviceView>> {
    let handle = state
        .registry
        .get(DeviceId(id))
        .await
        .ok_or_else(|| OrcError::device_not_found(id))?;
    Ok(Json(handle.snapshot().into()))
}

/// Declares a new device (config entry + a freshly spawned, disconnected
/// owner loop). Wiring its MQTT session is the daemon's job at bootstrap
/// (§10.1) — a device added at runtime only starts talking once the daemon
/// is restarted, or an operator reconnects it out of band.
pub async fn add_device(
    State(state): State<AppState>,
    Json(req): Json<AddDeviceRequest>,
) -> ApiResult<(StatusCode, Json<DeviceView>)> {
    let conn = DeviceConnection {
        id: req.id,
        name: req.name,
        device_type: req.device_type,
        data_root: req.data_root,
        quota_bytes: req.quota_bytes.unwrap_or(1024 * 1024 * 1024),
        auto_deletion: req.auto_deletion,
    };

    let (handle, _join) = device::spawn(&conn, state.notifications.clone());
    state.registry.insert(handle.clone()).await;

    {
        let mut config = state.config.snapshot().await;
        config.devices.retain(|d| d.id != conn.id);
        config.devices.push(conn);
    }

    Ok((StatusCode::CREATED, Json(handle.snapshot().into())))
}

pub async fn remove_device(
    State(state): State<AppState>,
    Path(id): Path<u16>,
) -> ApiResult<StatusCode> {
    let handle = state
        .registry
        .get(DeviceId(id))
        .await
        .ok_or_else(|| OrcError::device_not_found(id))?;
    let _ = handle.transition(DeviceState::Disconnected).await;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::build_router;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app(state: AppState) -> axum::Router {
        build_router(state)
    }

    #[tokio::test]
    async fn add_then_list_then_get() {
        let state = crate::state::test_state();
        let router = app(state);

        let body = serde_json::json!({
            "id": 1883,
            "name": "cam-01",
            "data_root": "/tmp/cam-01"
        });
        let response = router
            .clone()
            .oneshot(
                Request::post("/devices")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = router
            .clone()
            .oneshot(Request::get("/devices").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.len(), 1);

        let response = router
            .oneshot(Request::get("/devices/1883").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["id"], 1883);
        assert_eq!(json["state"], "uninitialized");
    }

    #[tokio::test]
    async fn get_unknown_device_is_404() {
        let router = app(crate::state::test_state());
        let response = router
            .oneshot(Request::get("/devices/9999").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
