//! Configuration loading and parsing

use anyhow::{Context, Result};
use buslog_pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from buslog.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

/// Where the CAN rule documents live
///
/// `config_dir` resolves both documents under `<config_dir>/can/`; the
/// explicit paths take precedence over it.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RulesConfig {
    pub config_dir: Option<PathBuf>,
    pub row_filter: Option<PathBuf>,
    pub can_definitions: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProcessingConfig {
    pub min_parallel_rows: Option<usize>,
    pub max_workers: Option<usize>,
}

impl AppConfig {
    /// Build the library configuration, optionally overriding the upload dir
    pub fn pipeline_config(&self, upload_dir: Option<&Path>) -> PipelineConfig {
        let upload_dir = upload_dir.unwrap_or(&self.storage.upload_dir);
        let mut config = PipelineConfig::new(upload_dir);

        if let Some(dir) = &self.rules.config_dir {
            config = config.with_config_dir(dir);
        }
        if let Some(path) = &self.rules.row_filter {
            config = config.with_row_filter(path);
        }
        if let Some(path) = &self.rules.can_definitions {
            config = config.with_definitions(path);
        }
        if let Some(rows) = self.processing.min_parallel_rows {
            config = config.with_min_parallel_rows(rows);
        }
        if let Some(workers) = self.processing.max_workers {
            config = config.with_max_workers(workers);
        }

        config
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}
