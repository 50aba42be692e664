use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use audiobook_library_core::config::{self, CliConfig, DatabaseType, OrganizationStrategy};
use audiobook_library_core::diagnostics;
use audiobook_library_core::resolver::sources::MetadataSource;
use audiobook_library_core::secret::SecretString;
use audiobook_library_core::shadow::torrent_client::TorrentClient;

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Root directory the library lives under.
    #[clap(long)]
    root_dir: Option<PathBuf>,

    /// Path to the sqlite database file. Defaults to `<root_dir>/library.db`.
    #[clap(long)]
    database_path: Option<PathBuf>,

    #[clap(long, value_enum, default_value = "sqlite")]
    database_type: DatabaseType,

    #[clap(long, default_value_t = 4)]
    concurrent_scans: usize,

    #[clap(long, value_enum, default_value = "auto")]
    organization_strategy: OrganizationStrategy,

    #[clap(long, default_value = "{author}/{series}/{title}")]
    folder_naming_pattern: String,

    #[clap(long, default_value = "{title}")]
    file_naming_pattern: String,

    #[clap(long, default_value_t = false)]
    create_backups: bool,

    #[clap(long, default_value_t = false)]
    auto_fetch_metadata: bool,

    #[clap(long, default_value_t = false)]
    enable_ai_parsing: bool,

    #[clap(long)]
    openai_api_key: Option<String>,

    #[clap(long)]
    itunes_library_path: Option<PathBuf>,

    #[clap(long, default_value_t = 500)]
    cache_size: usize,

    #[clap(long, default_value = "info")]
    log_level: String,

    #[clap(long, default_value = "pretty")]
    log_format: String,
}

impl From<&CliArgs> for CliConfig {
    fn from(args: &CliArgs) -> Self {
        CliConfig {
            root_dir: args.root_dir.clone(),
            database_path: args.database_path.clone(),
            database_type: args.database_type,
            concurrent_scans: args.concurrent_scans,
            organization_strategy: args.organization_strategy,
            folder_naming_pattern: args.folder_naming_pattern.clone(),
            file_naming_pattern: args.file_naming_pattern.clone(),
            create_backups: args.create_backups,
            auto_fetch_metadata: args.auto_fetch_metadata,
            enable_ai_parsing: args.enable_ai_parsing,
            openai_api_key: args.openai_api_key.clone().map(SecretString::new),
            itunes_library_path: args.itunes_library_path.clone(),
            cache_size: args.cache_size,
            log_level: args.log_level.clone(),
            log_format: args.log_format.clone(),
        }
    }
}

/// No external metadata sources or torrent client are wired up by default —
/// both require credentials this repo has no config surface for yet. A
/// deployment that needs them constructs the trait objects here.
fn configured_sources(_config: &config::AppConfig) -> Vec<Arc<dyn MetadataSource>> {
    Vec::new()
}

fn configured_torrent_client(_config: &config::AppConfig) -> Option<Arc<dyn TorrentClient>> {
    None
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => {
            info!(?path, "loading configuration file");
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    let cli_config: CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!(root_dir = ?app_config.root_dir, database_path = ?app_config.database_path, "configuration resolved");

    diagnostics::run_startup_checks(&app_config.root_dir, &app_config.database_path, app_config.organization_strategy)?;

    let sources = configured_sources(&app_config);
    let torrent_client = configured_torrent_client(&app_config);
    let itunes_library_path = app_config.itunes_library_path.clone();

    let core = audiobook_library_core::build(app_config, sources, torrent_client.clone())?;
    let watcher = audiobook_library_core::core::spawn_background_loops(&core, torrent_client, itunes_library_path)?;

    info!("catalog core running");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
        _ = core.shutdown.cancelled() => {
            error!("shutdown triggered internally");
        }
    }

    core.shutdown.cancel();
    drop(watcher);

    Ok(())
}
