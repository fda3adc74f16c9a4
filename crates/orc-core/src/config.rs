//! `GlobalConfiguration`: device declarations, webserver settings and
//! deployment timeouts, plus the `Persistency` strategy backing
//! `update_persistent_attr` (§4.7).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use orc_protocol::{DeviceConnection, DeviceId, Kind, OrcError, OrcResult};

fn default_webserver_host() -> String {
    "0.0.0.0".to_string()
}

fn default_webserver_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebserverConfig {
    #[serde(default = "default_webserver_host")]
    pub host: String,
    #[serde(default = "default_webserver_port")]
    pub port: u16,
}

impl Default for WebserverConfig {
    fn default() -> Self {
        WebserverConfig {
            host: default_webserver_host(),
            port: default_webserver_port(),
        }
    }
}

fn default_artifacts_host() -> String {
    "0.0.0.0".to_string()
}

fn default_artifacts_port() -> u16 {
    8081
}

fn default_artifacts_retention_secs() -> u64 {
    30
}

fn default_artifacts_preview_enabled() -> bool {
    true
}

/// Bind address and behavior for the artifact ingestion webserver (§4.5),
/// kept separate from [`WebserverConfig`] since the two listen on distinct
/// ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_artifacts_host")]
    pub host: String,
    #[serde(default = "default_artifacts_port")]
    pub port: u16,
    #[serde(default = "default_artifacts_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_artifacts_preview_enabled")]
    pub preview_enabled: bool,
}

impl ArtifactsConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        ArtifactsConfig {
            host: default_artifacts_host(),
            port: default_artifacts_port(),
            retention_secs: default_artifacts_retention_secs(),
            preview_enabled: default_artifacts_preview_enabled(),
        }
    }
}

fn default_firmware_timeout_secs() -> u64 {
    300
}

fn default_model_undeploy_timeout_secs() -> u64 {
    60
}

fn default_model_deploy_timeout_secs() -> u64 {
    120
}

fn default_app_timeout_secs() -> u64 {
    60
}

/// Per-kind deployment deadlines (§5: "Tasks set their own deadlines").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentTimeouts {
    #[serde(default = "default_firmware_timeout_secs")]
    pub firmware_timeout_secs: u64,
    #[serde(default = "default_model_undeploy_timeout_secs")]
    pub model_undeploy_timeout_secs: u64,
    #[serde(default = "default_model_deploy_timeout_secs")]
    pub model_deploy_timeout_secs: u64,
    #[serde(default = "default_app_timeout_secs")]
    pub app_timeout_secs: u64,
}

impl DeploymentTimeouts {
    pub fn firmware_timeout(&self) -> Duration {
        Duration::from_secs(self.firmware_timeout_secs)
    }

    pub fn model_undeploy_timeout(&self) -> Duration {
        Duration::from_secs(self.model_undeploy_timeout_secs)
    }

    pub fn model_deploy_timeout(&self) -> Duration {
        Duration::from_secs(self.model_deploy_timeout_secs)
    }

    pub fn app_timeout(&self) -> Duration {
        Duration::from_secs(self.app_timeout_secs)
    }
}

impl Default for DeploymentTimeouts {
    fn default() -> Self {
        DeploymentTimeouts {
            firmware_timeout_secs: default_firmware_timeout_secs(),
            model_undeploy_timeout_secs: default_model_undeploy_timeout_secs(),
            model_deploy_timeout_secs: default_model_deploy_timeout_secs(),
            app_timeout_secs: default_app_timeout_secs(),
        }
    }
}

/// In-memory singleton contract (§4.7), implemented as an explicit handle
/// rather than a language-level singleton (§9: "replace with explicit
/// dependency injection").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfiguration {
    #[serde(default)]
    pub devices: Vec<DeviceConnection>,
    #[serde(default)]
    pub webserver: WebserverConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub deployment: DeploymentTimeouts,
}

impl GlobalConfiguration {
    pub fn from_toml_str(s: &str) -> OrcResult<Self> {
        toml::from_str(s).map_err(|e| {
            OrcError::new(Kind::InternalInvariantViolation, format!("invalid configuration: {e}"))
        })
    }

    pub fn device(&self, id: DeviceId) -> Option<&DeviceConnection> {
        self.devices.iter().find(|d| d.id == id)
    }
}

/// Persistence strategy for `GlobalConfiguration` (§4.7, §10.4). `OnDisk`
/// writes to a sibling temp file and renames over the target so a reader
/// never observes a half-written file; `InMemory` is the test double.
#[async_trait]
pub trait Persistency: Send + Sync {
    async fn save(&self, config: &GlobalConfiguration) -> OrcResult<()>;
}

pub struct OnDisk {
    path: PathBuf,
}

impl OnDisk {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        OnDisk { path: path.into() }
    }
}

#[async_trait]
impl Persistency for OnDisk {
    async fn save(&self, config: &GlobalConfiguration) -> OrcResult<()> {
        let serialized = toml::to_string_pretty(config).map_err(|e| {
            OrcError::new(Kind::InternalInvariantViolation, format!("serialize config: {e}"))
        })?;

        let tmp_path = self.path.with_extension("toml.tmp");
        tokio::fs::write(&tmp_path, serialized)
            .await
            .map_err(|e| OrcError::new(Kind::InternalInvariantViolation, format!("write config: {e}")))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| OrcError::new(Kind::InternalInvariantViolation, format!("rename config: {e}")))?;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemory {
    saved: Mutex<Option<GlobalConfiguration>>,
}

impl InMemory {
    pub fn new() -> Self {
        InMemory::default()
    }

    pub async fn last_saved(&self) -> Option<GlobalConfiguration> {
        self.saved.lock().await.clone()
    }
}

#[async_trait]
impl Persistency for InMemory {
    async fn save(&self, config: &GlobalConfiguration) -> OrcResult<()> {
        *self.saved.lock().await = Some(config.clone());
        Ok(())
    }
}

/// Reader-writer synchronized configuration handle (§5: "Configuration —
/// reader-writer synchronized, readers receive an immutable snapshot").
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<GlobalConfiguration>>,
    persistency: Arc<dyn Persistency>,
}

impl ConfigHandle {
    pub fn new(config: GlobalConfiguration, persistency: Arc<dyn Persistency>) -> Self {
        ConfigHandle {
            inner: Arc::new(RwLock::new(config)),
            persistency,
        }
    }

    /// Non-blocking snapshot for readers.
    pub async fn snapshot(&self) -> GlobalConfiguration {
        self.inner.read().await.clone()
    }

    /// Applies `mutate` to the in-memory device record, then asks the
    /// current `Persistency` strategy to save the whole configuration
    /// (§4.7: "(a) updates in-memory, (b) asks the current `Persistency`
    /// strategy to save").
    pub async fn update_persistent_attr(
        &self,
        device_id: DeviceId,
        mutate: impl FnOnce(&mut DeviceConnection),
    ) -> OrcResult<()> {
        let snapshot = {
            let mut guard = self.inner.write().await;
            let device = guard
                .devices
                .iter_mut()
                .find(|d| d.id == device_id)
                .ok_or_else(|| OrcError::device_not_found(device_id))?;
            mutate(device);
            guard.clone()
        };
        self.persistency.save(&snapshot).await
    }
}
