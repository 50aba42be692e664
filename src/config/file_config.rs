//! TOML file configuration — overrides CLI values where present (§6.3).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::secret::SecretString;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub root_dir: Option<String>,
    pub database_path: Option<String>,
    pub database_type: Option<String>,
    pub concurrent_scans: Option<usize>,
    pub organization_strategy: Option<String>,
    pub folder_naming_pattern: Option<String>,
    pub file_naming_pattern: Option<String>,
    pub create_backups: Option<bool>,
    pub auto_fetch_metadata: Option<bool>,
    pub enable_ai_parsing: Option<bool>,
    pub openai_api_key: Option<SecretString>,
    pub itunes_library_path: Option<String>,
    pub cache_size: Option<usize>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub download_client: Option<DownloadClientConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DownloadClientConfig {
    pub kind: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub shadow_dir: Option<String>,
    pub max_lifetime_days: Option<u32>,
    pub pause_timeout_days: Option<u32>,
    pub inactivity_window_days: Option<u32>,
    pub upload_activity_threshold_pct: Option<f64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("failed to parse config file: {:?}", path))
    }
}
