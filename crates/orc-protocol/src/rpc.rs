//! MQTT RPC envelopes and OTA desired-state bodies (§6).
//!
//! Two dialects, selected per-device by `DeviceType`:
//! - V1: desired state lives under one base64-encoded key; RPC calls are a
//!   flat `{method, params}` envelope.
//! - V2: desired state is a set of individually-keyed JSON strings, each
//!   carrying its own `req_info`/`res_info` correlation envelope.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

/// The single base64-encoded key every V1 desired-state write lands under.
pub const V1_PLACEHOLDER_KEY: &str = "configuration/backdoor-EA_Main/placeholder";

/// Which firmware module an OTA desired-state update targets. REST request
/// bodies spell this `snake_case` ("sensor_fw"/"ap_fw"); the wire-protocol
/// string used in the OTA envelope itself is the separate `as_str()` below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirmwareModule {
    SensorFw,
    ApFw,
}

impl FirmwareModule {
    pub fn as_str(self) -> &'static str {
        match self {
            FirmwareModule::SensorFw => "SensorFw",
            FirmwareModule::ApFw => "ApFw",
        }
    }
}

/// `OTA.*` desired-state body for a firmware update (§4.4 FirmwareTask step 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtaUpdateBody {
    #[serde(rename = "UpdateModule")]
    pub update_module: String,
    #[serde(rename = "DesiredVersion")]
    pub desired_version: String,
    #[serde(rename = "PackageUri")]
    pub package_uri: String,
    #[serde(rename = "HashValue")]
    pub hash_value: String,
}

impl OtaUpdateBody {
    pub fn new(
        module: FirmwareModule,
        desired_version: impl Into<String>,
        package_uri: impl Into<String>,
        hash_value: impl Into<String>,
    ) -> Self {
        OtaUpdateBody {
            update_module: module.as_str().to_string(),
            desired_version: desired_version.into(),
            package_uri: package_uri.into(),
            hash_value: hash_value.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtaUpdateEnvelope {
    #[serde(rename = "OTA")]
    pub ota: OtaUpdateBody,
}

/// `OTA.DeleteNetworkID` desired-state body for a model undeploy (§4.4
/// ModelTask step 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnnDeleteBody {
    #[serde(rename = "UpdateModule")]
    pub update_module: String,
    #[serde(rename = "DeleteNetworkID")]
    pub delete_network_id: String,
}

impl DnnDeleteBody {
    pub fn new(network_id: impl Into<String>) -> Self {
        DnnDeleteBody {
            update_module: "DnnModel".to_string(),
            delete_network_id: network_id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnnDeleteEnvelope {
    #[serde(rename = "OTA")]
    pub ota: DnnDeleteBody,
}

/// `OTA.DesiredVersion/PackageUri/HashValue` for a model deploy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnnOtaBody {
    #[serde(rename = "UpdateModule")]
    pub update_module: String,
    #[serde(rename = "DesiredVersion")]
    pub desired_version: String,
    #[serde(rename = "PackageUri")]
    pub package_uri: String,
    #[serde(rename = "HashValue")]
    pub hash_value: String,
}

impl DnnOtaBody {
    pub fn new(
        desired_version: impl Into<String>,
        package_uri: impl Into<String>,
        hash_value: impl Into<String>,
    ) -> Self {
        DnnOtaBody {
            update_module: "DnnModel".to_string(),
            desired_version: desired_version.into(),
            package_uri: package_uri.into(),
            hash_value: hash_value.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnnOtaEnvelope {
    #[serde(rename = "OTA")]
    pub ota: DnnOtaBody
}

/// Wrap a desired-state body under the V1 base64 placeholder key, ready to
/// publish on `attributes`.
pub fn encode_v1_desired_state<T: Serialize>(
    body: &T,
) -> Result<serde_json::Value, serde_json::Error> {
    let inner = serde_json::to_vec(body)?;
    let encoded = BASE64.encode(inner);
    Ok(serde_json::json!({ V1_PLACEHOLDER_KEY: encoded }))
}

/// Decode a V1 desired-state value previously produced by
/// `encode_v1_desired_state`.
pub fn decode_v1_desired_state<T: for<'de> Deserialize<'de>>(
    value: &serde_json::Value,
) -> Option<T> {
    let encoded = value.get(V1_PLACEHOLDER_KEY)?.as_str()?;
    let decoded = BASE64.decode(encoded).ok()?;
    serde_json::from_slice(&decoded).ok()
}

/// V1 RPC envelope: `{method: "ModuleMethodCall", params: {moduleMethod, moduleInstance, params}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequestV1 {
    pub method: String,
    pub params: RpcParamsV1,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcParamsV1 {
    #[serde(rename = "moduleMethod")]
    pub module_method: String,
    #[serde(rename = "moduleInstance")]
    pub module_instance: String,
    pub params: serde_json::Value,
}

/// V2 correlation envelope embedded in each keyed configuration value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReqInfo {
    pub req_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResInfo {
    pub res_id: String,
    pub code: i64,
    pub detail_msg: String,
}

/// V2 RPC envelope: `{method, params: {direct-command-request: {reqid, method, instance, params}}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequestV2 {
    pub method: String,
    pub params: RpcParamsV2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcParamsV2 {
    #[serde(rename = "direct-command-request")]
    pub direct_command_request: DirectCommandRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectCommandRequest {
    pub reqid: String,
    pub method: String,
    pub instance: String,
    /// A JSON-encoded string, per §6 ("params: <JSON-string>").
    pub params: String,
}

/// Response body of a `DirectGetImage` RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectGetImageResponse {
    #[serde(rename = "Image")]
    pub image_base64: String,
}

/// App deployment manifest module (§4.4 AppTask step 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentManifestModule {
    pub module_id: String,
    pub download_url: String,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentManifest {
    pub deployment_id: String,
    pub modules: Vec<DeploymentManifestModule>,
}

/// Device-reported reconciliation status for a deployment manifest (§4.4
/// step 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub deployment_id: String,
    pub reconcile_status: String,
}

impl DeploymentStatus {
    pub fn is_ok(&self) -> bool {
        self.reconcile_status == "ok"
    }
}
