//! `POST /edge_apps`, `GET /edge_apps`, `POST /firmwares`, `POST /models`,
//! `POST /deploy_configs`, `POST /deploy_configs/{id}/apply` (§6). Pure
//! translation from a deployment request body to a submission on the task
//! executor — the REST/DTO layer itself is out of scope (§1), so these
//! handlers carry no catalog storage of their own beyond what the request
//! body already supplies.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use orc_protocol::rpc::FirmwareModule;
use orc_protocol::{DeviceId, OrcError};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::tasks::app::AppSpec;
use crate::tasks::config::ConfigTask;
use crate::tasks::firmware::FirmwareSpec;
use crate::tasks::model::ModelSpec;
use crate::tasks::{AppTask, FirmwareTask, ModelTask, TaskContext};

async fn task_context(state: &AppState, device_id: DeviceId) -> ApiResult<TaskContext> {
    let device = state
        .registry
        .get(device_id)
        .await
        .ok_or_else(|| OrcError::device_not_found(device_id))?;
    let mqtt = state
        .registry
        .mqtt_port(device_id)
        .await
        .ok_or_else(|| OrcError::device_not_found(device_id))?;
    Ok(TaskContext::new(device, mqtt))
}

#[derive(Debug, Deserialize)]
pub struct EdgeAppRequest {
    pub device_id: DeviceId,
    pub deployment_id: String,
    pub module_id: String,
    #[serde(with = "base64_bytes")]
    pub module_bytes: Vec<u8>,
    pub download_url: String,
    #[serde(default = "default_app_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_app_timeout_secs() -> u64 {
    60
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

pub async fn list_edge_apps() -> Json<Vec<serde_json::Value>> {
    // The catalog itself is out of scope (§1) — deployed apps are tracked
    // through `deploy_history`, not a separate store.
    Json(Vec::new())
}

pub async fn deploy_edge_app(
    State(state): State<AppState>,
    Json(req): Json<EdgeAppRequest>,
) -> ApiResult<StatusCode> {
    let ctx = task_context(&state, req.device_id).await?;
    let task = Arc::new(AppTask::new(
        ctx,
        AppSpec {
            deployment_id: req.deployment_id,
            module_id: req.module_id,
            module_bytes: req.module_bytes,
            download_url: req.download_url,
            timeout: Duration::from_secs(req.timeout_secs),
        },
    ));
    state.executor.submit(task).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct FirmwareRequest {
    pub device_id: DeviceId,
    pub module: FirmwareModule,
    pub desired_version: String,
    pub package_uri: String,
    pub hash_value: String,
}

pub async fn deploy_firmware(
    State(state): State<AppState>,
    Json(req): Json<FirmwareRequest>,
) -> ApiResult<StatusCode> {
    let ctx = task_context(&state, req.device_id).await?;
    let timeout = state.config.snapshot().await.deployment.firmware_timeout();
    let task = Arc::new(FirmwareTask::new(
        ctx,
        FirmwareSpec {
            module: req.module,
            desired_version: req.desired_version,
            package_uri: req.package_uri,
            hash_value: req.hash_value,
        },
        timeout,
    ));
    state.executor.submit(task).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct ModelRequest {
    pub device_id: DeviceId,
    pub desired_version: String,
    pub package_uri: String,
    pub hash_value: String,
    #[serde(with = "base64_bytes")]
    pub package_bytes: Vec<u8>,
    #[serde(default)]
    pub is_rpk: bool,
}

pub async fn deploy_model(
    State(state): State<AppState>,
    Json(req): Json<ModelRequest>,
) -> ApiResult<StatusCode> {
    let ctx = task_context(&state, req.device_id).await?;
    let timeouts = state.config.snapshot().await.deployment;
    let task = Arc::new(ModelTask::new(
        ctx,
        ModelSpec {
            desired_version: req.desired_version,
            package_uri: req.package_uri,
            hash_value: req.hash_value,
            package_bytes: req.package_bytes,
            is_rpk: req.is_rpk,
            undeploy_timeout: timeouts.model_undeploy_timeout(),
            deploy_timeout: timeouts.model_deploy_timeout(),
        },
    ));
    state.executor.submit(task).await?;
    Ok(StatusCode::ACCEPTED)
}

/// A composite config is accepted and its id handed back; applying it (the
/// part that actually touches a device) happens on `POST /deploy_configs/{id}/apply`.
/// Storage of the pending config itself lives only as long as the request —
/// `apply` takes the full body again, consistent with the REST layer being
/// pure translation rather than an additional source of truth.
#[derive(Debug, Deserialize)]
pub struct DeployConfigRequest {
    pub device_id: DeviceId,
    #[serde(default)]
    pub firmware: Option<FirmwareRequest>,
    #[serde(default)]
    pub model: Option<ModelRequest>,
    #[serde(default)]
    pub app: Option<EdgeAppRequest>,
}

pub async fn create_deploy_config(Json(_req): Json<DeployConfigRequest>) -> StatusCode {
    StatusCode::ACCEPTED
}

pub async fn apply_deploy_config(
    State(state): State<AppState>,
    Path(_id): Path<String>,
    Json(req): Json<DeployConfigRequest>,
) -> ApiResult<StatusCode> {
    let ctx = task_context(&state, req.device_id).await?;
    let timeouts = state.config.snapshot().await.deployment;

    let firmware = req.firmware.map(|f| {
        FirmwareTask::new(
            ctx.clone(),
            FirmwareSpec {
                module: f.module,
                desired_version: f.desired_version,
                package_uri: f.package_uri,
                hash_value: f.hash_value,
            },
            timeouts.firmware_timeout(),
        )
    });
    let model = req.model.map(|m| {
        ModelTask::new(
            ctx.clone(),
            ModelSpec {
                desired_version: m.desired_version,
                package_uri: m.package_uri,
                hash_value: m.hash_value,
                package_bytes: m.package_bytes,
                is_rpk: m.is_rpk,
                undeploy_timeout: timeouts.model_undeploy_timeout(),
                deploy_timeout: timeouts.model_deploy_timeout(),
            },
        )
    });
    let app = req.app.map(|a| {
        AppTask::new(
            ctx.clone(),
            AppSpec {
                deployment_id: a.deployment_id,
                module_id: a.module_id,
                module_bytes: a.module_bytes,
                download_url: a.download_url,
                timeout: Duration::from_secs(a.timeout_secs),
            },
        )
    });

    let task = Arc::new(ConfigTask::new(ctx, firmware, model, app));
    state.executor.submit(task).await?;
    Ok(StatusCode::ACCEPTED)
}
