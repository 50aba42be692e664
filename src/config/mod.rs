mod file_config;

pub use file_config::{DownloadClientConfig, FileConfig};

use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

use crate::secret::SecretString;

/// Which backend the store opens. Only `sqlite` is implemented; `pebble` is
/// accepted for config compatibility but rejected at startup diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
#[clap(rename_all = "lowercase")]
pub enum DatabaseType {
    #[default]
    Sqlite,
    Pebble,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
#[clap(rename_all = "lowercase")]
pub enum OrganizationStrategy {
    #[default]
    Auto,
    Copy,
    Hardlink,
    Reflink,
    Symlink,
}

impl OrganizationStrategy {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "copy" => Some(Self::Copy),
            "hardlink" => Some(Self::Hardlink),
            "reflink" => Some(Self::Reflink),
            "symlink" => Some(Self::Symlink),
            _ => None,
        }
    }
}

/// CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub root_dir: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub database_type: DatabaseType,
    pub concurrent_scans: usize,
    pub organization_strategy: OrganizationStrategy,
    pub folder_naming_pattern: String,
    pub file_naming_pattern: String,
    pub create_backups: bool,
    pub auto_fetch_metadata: bool,
    pub enable_ai_parsing: bool,
    pub openai_api_key: Option<SecretString>,
    pub itunes_library_path: Option<PathBuf>,
    pub cache_size: usize,
    pub log_level: String,
    pub log_format: String,
}

#[derive(Debug, Clone)]
pub struct DownloadClientSettings {
    pub kind: String,
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub shadow_dir: Option<PathBuf>,
    pub max_lifetime_days: u32,
    pub pause_timeout_days: u32,
    pub inactivity_window_days: u32,
    pub upload_activity_threshold_pct: f64,
}

impl Default for DownloadClientSettings {
    fn default() -> Self {
        Self {
            kind: "none".to_string(),
            base_url: None,
            api_key: None,
            shadow_dir: None,
            max_lifetime_days: 60,
            pause_timeout_days: 7,
            inactivity_window_days: 14,
            upload_activity_threshold_pct: 20.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub root_dir: PathBuf,
    pub database_path: PathBuf,
    pub database_type: DatabaseType,
    pub concurrent_scans: usize,
    pub organization_strategy: OrganizationStrategy,
    pub folder_naming_pattern: String,
    pub file_naming_pattern: String,
    pub create_backups: bool,
    pub auto_fetch_metadata: bool,
    pub enable_ai_parsing: bool,
    pub openai_api_key: Option<SecretString>,
    pub itunes_library_path: Option<PathBuf>,
    pub cache_size: usize,
    pub log_level: String,
    pub log_format: String,
    pub download_client: DownloadClientSettings,
}

impl AppConfig {
    /// Resolves configuration from CLI arguments and optional TOML file
    /// config. TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let root_dir = file
            .root_dir
            .map(PathBuf::from)
            .or_else(|| cli.root_dir.clone())
            .ok_or_else(|| anyhow::anyhow!("root_dir must be specified via --root-dir or in config file"))?;

        let database_path = file
            .database_path
            .map(PathBuf::from)
            .or_else(|| cli.database_path.clone())
            .unwrap_or_else(|| root_dir.join("library.db"));

        let database_type = match file.database_type.as_deref() {
            Some("sqlite") => DatabaseType::Sqlite,
            Some("pebble") => DatabaseType::Pebble,
            Some(other) => bail!("unknown database_type: {other}"),
            None => cli.database_type,
        };

        let concurrent_scans = file.concurrent_scans.unwrap_or(cli.concurrent_scans).max(1);

        let organization_strategy = match file.organization_strategy.as_deref() {
            Some(s) => OrganizationStrategy::parse(s)
                .ok_or_else(|| anyhow::anyhow!("unknown organization_strategy: {s}"))?,
            None => cli.organization_strategy,
        };

        let folder_naming_pattern = file
            .folder_naming_pattern
            .unwrap_or_else(|| cli.folder_naming_pattern.clone());
        let file_naming_pattern = file
            .file_naming_pattern
            .unwrap_or_else(|| cli.file_naming_pattern.clone());

        let create_backups = file.create_backups.unwrap_or(cli.create_backups);
        let auto_fetch_metadata = file.auto_fetch_metadata.unwrap_or(cli.auto_fetch_metadata);
        let enable_ai_parsing = file.enable_ai_parsing.unwrap_or(cli.enable_ai_parsing);
        let openai_api_key = file.openai_api_key.or_else(|| cli.openai_api_key.clone());

        let itunes_library_path = file
            .itunes_library_path
            .map(PathBuf::from)
            .or_else(|| cli.itunes_library_path.clone());

        let cache_size = file.cache_size.unwrap_or(cli.cache_size);
        let log_level = file.log_level.unwrap_or_else(|| cli.log_level.clone());
        let log_format = file.log_format.unwrap_or_else(|| cli.log_format.clone());

        let dc_file = file.download_client.unwrap_or_default();
        let dc_defaults = DownloadClientSettings::default();
        let download_client = DownloadClientSettings {
            kind: dc_file.kind.unwrap_or(dc_defaults.kind),
            base_url: dc_file.base_url,
            api_key: dc_file.api_key,
            shadow_dir: dc_file.shadow_dir.map(PathBuf::from),
            max_lifetime_days: dc_file.max_lifetime_days.unwrap_or(dc_defaults.max_lifetime_days),
            pause_timeout_days: dc_file.pause_timeout_days.unwrap_or(dc_defaults.pause_timeout_days),
            inactivity_window_days: dc_file
                .inactivity_window_days
                .unwrap_or(dc_defaults.inactivity_window_days),
            upload_activity_threshold_pct: dc_file
                .upload_activity_threshold_pct
                .unwrap_or(dc_defaults.upload_activity_threshold_pct),
        };

        Ok(Self {
            root_dir,
            database_path,
            database_type,
            concurrent_scans,
            organization_strategy,
            folder_naming_pattern,
            file_naming_pattern,
            create_backups,
            auto_fetch_metadata,
            enable_ai_parsing,
            openai_api_key,
            itunes_library_path,
            cache_size,
            log_level,
            log_format,
            download_client,
        })
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            database_path: None,
            database_type: DatabaseType::Sqlite,
            concurrent_scans: 4,
            organization_strategy: OrganizationStrategy::Auto,
            folder_naming_pattern: "{author}/{series}/{title}".to_string(),
            file_naming_pattern: "{title}".to_string(),
            create_backups: true,
            auto_fetch_metadata: false,
            enable_ai_parsing: false,
            openai_api_key: None,
            itunes_library_path: None,
            cache_size: 1000,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_temp_root() -> TempDir {
        TempDir::new().unwrap()
    }

    #[test]
    fn resolve_cli_only() {
        let temp_dir = make_temp_root();
        let cli = CliConfig { root_dir: Some(temp_dir.path().to_path_buf()), ..Default::default() };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.root_dir, temp_dir.path());
        assert_eq!(config.concurrent_scans, 4);
        assert_eq!(config.organization_strategy, OrganizationStrategy::Auto);
        assert!(config.create_backups);
    }

    #[test]
    fn file_overrides_cli() {
        let temp_dir = make_temp_root();
        let cli = CliConfig {
            root_dir: Some(PathBuf::from("/should/be/overridden")),
            concurrent_scans: 2,
            ..Default::default()
        };
        let file_config = FileConfig {
            root_dir: Some(temp_dir.path().to_string_lossy().to_string()),
            concurrent_scans: Some(8),
            organization_strategy: Some("reflink".to_string()),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        assert_eq!(config.root_dir, temp_dir.path());
        assert_eq!(config.concurrent_scans, 8);
        assert_eq!(config.organization_strategy, OrganizationStrategy::Reflink);
    }

    #[test]
    fn missing_root_dir_errors() {
        let cli = CliConfig::default();
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("root_dir must be specified"));
    }

    #[test]
    fn unknown_organization_strategy_errors() {
        let temp_dir = make_temp_root();
        let cli = CliConfig { root_dir: Some(temp_dir.path().to_path_buf()), ..Default::default() };
        let file_config = FileConfig { organization_strategy: Some("teleport".to_string()), ..Default::default() };
        let result = AppConfig::resolve(&cli, Some(file_config));
        assert!(result.is_err());
    }

    #[test]
    fn concurrent_scans_floors_at_one() {
        let temp_dir = make_temp_root();
        let cli = CliConfig {
            root_dir: Some(temp_dir.path().to_path_buf()),
            concurrent_scans: 0,
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, None).unwrap();
        assert_eq!(config.concurrent_scans, 1);
    }

    #[test]
    fn secret_is_masked_in_debug_output() {
        let temp_dir = make_temp_root();
        let cli = CliConfig {
            root_dir: Some(temp_dir.path().to_path_buf()),
            openai_api_key: Some(SecretString::new("sk-test-key".into())),
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, None).unwrap();
        let rendered = format!("{:?}", config.openai_api_key);
        assert!(!rendered.contains("sk-test-key"));
    }
}
