//! Application configuration.
//!
//! Settings come from, in increasing priority: built-in defaults, a JSON
//! config file, `TUNEFETCH_*` environment variables, and finally command-line
//! flags (applied by the binary).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::batch::BatchPolicy;
use crate::error::ConfigError;
use crate::orchestrator::{DEFAULT_MAX_WORKERS, OrchestratorConfig};
use crate::upload::UploadConfig;
pub use crate::ytdlp::YtDlpConfig;

/// Upper bound accepted for `max_workers`.
pub const MAX_WORKERS_LIMIT: usize = 16;

/// Environment variable holding the storage account name.
pub const ENV_AZURE_ACCOUNT: &str = "TUNEFETCH_AZURE_ACCOUNT";
/// Environment variable holding the container name.
pub const ENV_AZURE_CONTAINER: &str = "TUNEFETCH_AZURE_CONTAINER";
/// Environment variable holding the SAS token.
pub const ENV_AZURE_SAS: &str = "TUNEFETCH_AZURE_SAS";

/// Worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DownloadSettings {
    /// Ceiling on concurrent downloads.
    pub max_workers: usize,
    /// Progress display cadence, in milliseconds.
    pub poll_interval_ms: u64,
    /// Wait for in-flight items after an interrupt, in milliseconds.
    pub grace_period_ms: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            poll_interval_ms: 500,
            grace_period_ms: 1000,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Base folder for playlist directories.
    pub output_folder: PathBuf,
    /// Worker pool settings.
    pub download: DownloadSettings,
    /// `yt-dlp` settings.
    pub ytdlp: YtDlpConfig,
    /// Reaction to a playlist that cannot be processed.
    pub batch_policy: BatchPolicy,
    /// Blob storage target, if uploads are configured.
    pub upload: Option<UploadConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_folder: PathBuf::from("output"),
            download: DownloadSettings::default(),
            ytdlp: YtDlpConfig::default(),
            batch_policy: BatchPolicy::default(),
            upload: None,
        }
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the default location is
    /// used if a file is there, and built-in defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => {
                let path = default_config_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    debug!("Config file not found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from a JSON file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            reason: format!("Failed to read config file: {e}"),
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| ConfigError::Load {
            path: path.to_path_buf(),
            reason: format!("Failed to parse config file: {e}"),
        })?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `TUNEFETCH_AZURE_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply `TUNEFETCH_AZURE_*` overrides using `lookup` to read variables.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let account = read(ENV_AZURE_ACCOUNT);
        let container = read(ENV_AZURE_CONTAINER);
        let sas = read(ENV_AZURE_SAS);

        if account.is_none() && container.is_none() && sas.is_none() {
            return;
        }

        let upload = self.upload.get_or_insert_with(UploadConfig::default);
        if let Some(account) = account {
            upload.account = account;
        }
        if let Some(container) = container {
            upload.container = container;
        }
        if let Some(sas) = sas {
            upload.sas_token = sas;
        }
        debug!("Applied upload settings from environment");
    }

    /// Clamp and check values.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.download.max_workers = self.download.max_workers.clamp(1, MAX_WORKERS_LIMIT);

        if self.download.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "download.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.download.grace_period_ms == 0 {
            return Err(ConfigError::Invalid(
                "download.grace_period_ms must be greater than zero".to_string(),
            ));
        }
        if self.ytdlp.binary.trim().is_empty() {
            return Err(ConfigError::Invalid("ytdlp.binary must not be empty".to_string()));
        }
        if self.output_folder.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("output_folder must not be empty".to_string()));
        }
        Ok(())
    }

    /// Orchestrator settings derived from this configuration.
    #[must_use]
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_workers: self.download.max_workers,
            cpu_count: None,
            poll_interval: Duration::from_millis(self.download.poll_interval_ms),
            grace_period: Duration::from_millis(self.download.grace_period_ms),
        }
    }

    /// Upload settings, if complete.
    pub fn upload_config(&self) -> Result<&UploadConfig, ConfigError> {
        match &self.upload {
            Some(upload) if upload.is_complete() => Ok(upload),
            _ => Err(ConfigError::MissingArgument(format!(
                "upload needs an account, a container and a SAS token \
                 (config file or {ENV_AZURE_ACCOUNT}, {ENV_AZURE_CONTAINER}, {ENV_AZURE_SAS})"
            ))),
        }
    }
}

/// Default path of the config file.
#[must_use]
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("tunefetch")
        .join("config.json")
}
