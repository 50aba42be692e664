//! Process wiring — builds the store, operation queue, handlers, and
//! background loops that `main.rs` drives. Kept separate from `main.rs` so
//! tests can build a `Core` against a temp directory without going through
//! CLI parsing.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::CatalogApi;
use crate::config::AppConfig;
use crate::itunes::ChangeFlag;
use crate::operation_queue::{OperationHandler, OperationQueue};
use crate::resolver::sources::MetadataSource;
use crate::resolver::CircuitBreaker;
use crate::scanner::ScanHandler;
use crate::shadow::config_override::ShadowConfig;
use crate::shadow::torrent_client::TorrentClient;
use crate::store::cache::CachedStore;
use crate::store::models::OperationType;
use crate::store::{SqliteStore, Store};

/// Everything a running process needs: the façade plus the handles
/// background loops are spawned from. `shutdown` is the root token; each
/// loop holds a child so `main.rs` can cancel all of them with one call.
pub struct Core {
    pub api: Arc<CatalogApi>,
    pub store: Arc<dyn Store>,
    pub queue: Arc<OperationQueue>,
    pub shutdown: CancellationToken,
    pub itunes_change_flag: ChangeFlag,
    pub shadow_config: ShadowConfig,
}

/// Builds the store, wraps it in the LRU cache, registers one handler per
/// `OperationType`, and assembles the façade. Does not start any
/// background loop — `main.rs` does that with the returned `Core`.
pub fn build(
    config: AppConfig,
    sources: Vec<Arc<dyn MetadataSource>>,
    torrent_client: Option<Arc<dyn TorrentClient>>,
) -> anyhow::Result<Core> {
    let inner = SqliteStore::open(&config.database_path)?;
    let store: Arc<dyn Store> = Arc::new(CachedStore::with_capacity(inner, config.cache_size));

    let shutdown = CancellationToken::new();

    let scan_handler = ScanHandler::new(store.clone(), config.root_dir.to_string_lossy().into_owned(), config.concurrent_scans);

    let mut handlers: HashMap<OperationType, Arc<dyn OperationHandler>> = HashMap::new();
    handlers.insert(OperationType::Scan, Arc::new(scan_handler));

    let breakers: HashMap<String, Arc<CircuitBreaker>> = sources.iter().map(|s| (s.name().to_string(), Arc::new(CircuitBreaker::new()))).collect();
    handlers.insert(
        OperationType::FetchMetadata,
        Arc::new(crate::resolver::FetchMetadataHandler::new(store.clone(), sources.clone(), breakers.clone())),
    );
    handlers.insert(OperationType::WriteBack, Arc::new(crate::writeback::WriteBackHandler::new(store.clone(), config.create_backups)));
    handlers.insert(
        OperationType::Organize,
        Arc::new(crate::organiser::OrganiseHandler::new(
            store.clone(),
            config.root_dir.to_string_lossy().into_owned(),
            config.folder_naming_pattern.clone(),
            config.file_naming_pattern.clone(),
            config.organization_strategy,
            config.concurrent_scans,
        )),
    );

    if let Some(library_path) = &config.itunes_library_path {
        let import_scan_handler = ScanHandler::new(store.clone(), config.root_dir.to_string_lossy().into_owned(), config.concurrent_scans);
        let import_handler = crate::itunes::ITunesImportHandler::new(
            store.clone(),
            import_scan_handler,
            crate::itunes::ImportOptions { library_path: library_path.clone() },
        );
        handlers.insert(OperationType::ItunesImport, Arc::new(import_handler));
    }

    let queue = OperationQueue::new(store.clone(), handlers, shutdown.clone());

    let shadow_config = ShadowConfig::from(&config.download_client);
    let itunes_change_flag = ChangeFlag::new();

    let api = Arc::new(CatalogApi::new(store.clone(), queue.clone(), sources, breakers, config));

    info!("core wired");

    let _ = torrent_client; // plugged in by `spawn_background_loops`, kept here for signature symmetry

    Ok(Core { api, store, queue, shutdown, itunes_change_flag, shadow_config })
}

/// Spawns the dispatcher loop and, when configured, the shadow-cleanup
/// ticker and the iTunes filesystem watcher. Returns the watcher guard
/// (must stay alive) when one was started.
pub fn spawn_background_loops(
    core: &Core,
    torrent_client: Option<Arc<dyn TorrentClient>>,
    itunes_library_path: Option<std::path::PathBuf>,
) -> anyhow::Result<Option<notify::RecommendedWatcher>> {
    tokio::spawn(core.queue.clone().run());

    if let Some(client) = torrent_client {
        let shadow_store = core.store.clone();
        let shadow_config = core.shadow_config.clone();
        let shadow_shutdown = core.shutdown.child_token();
        tokio::spawn(crate::shadow::cleanup::run_ticker(shadow_store, client, shadow_config, shadow_shutdown));
    }

    let watcher = match itunes_library_path {
        Some(path) => Some(crate::itunes::watcher::attach(&path, core.itunes_change_flag.clone())?),
        None => None,
    };

    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseType, DownloadClientSettings, OrganizationStrategy};
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> AppConfig {
        AppConfig {
            root_dir: dir.path().to_path_buf(),
            database_path: dir.path().join("library.db"),
            database_type: DatabaseType::Sqlite,
            concurrent_scans: 2,
            organization_strategy: OrganizationStrategy::Auto,
            folder_naming_pattern: "{author}/{title}".to_string(),
            file_naming_pattern: "{title}".to_string(),
            create_backups: false,
            auto_fetch_metadata: false,
            enable_ai_parsing: false,
            openai_api_key: None,
            itunes_library_path: None,
            cache_size: 100,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            download_client: DownloadClientSettings::default(),
        }
    }

    #[test]
    fn build_wires_a_usable_core() {
        let dir = TempDir::new().unwrap();
        let core = build(test_config(&dir), vec![], None).unwrap();

        let (books, total) = core.api.list_books(10, 0).unwrap();
        assert!(books.is_empty());
        assert_eq!(total, 0);
    }
}
