//! `Import(options)` — §4.I. Walks audiobook tracks from a library plist,
//! dedupes against existing books and blocked hashes, and hands each
//! survivor to the scanner's per-file processor.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::file_ops::compute_file_hash;
use crate::operation_queue::{OperationContext, OperationError, OperationHandler};
use crate::scanner::ScanHandler;
use crate::store::models::LogLevel;
use crate::store::Store;

use super::plist_model::parse_tracks;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub library_path: PathBuf,
}

pub struct ITunesImportHandler {
    store: Arc<dyn Store>,
    scan_handler: ScanHandler,
    options: ImportOptions,
}

impl ITunesImportHandler {
    pub fn new(store: Arc<dyn Store>, scan_handler: ScanHandler, options: ImportOptions) -> Self {
        Self { store, scan_handler, options }
    }
}

#[async_trait]
impl OperationHandler for ITunesImportHandler {
    async fn execute(&self, ctx: &OperationContext) -> Result<(), OperationError> {
        let tracks: Vec<_> = parse_tracks(&self.options.library_path)
            .map_err(|e| OperationError::Other(e.into()))?
            .into_iter()
            .filter(|t| t.is_audiobook)
            .collect();

        let total = tracks.len() as u64;
        let mut imported = 0u64;
        let mut skipped = 0u64;

        for (i, track) in tracks.iter().enumerate() {
            ctx.bail_if_canceled()?;

            let Some(path) = &track.location else {
                skipped += 1;
                continue;
            };
            if !path.exists() {
                skipped += 1;
                ctx.log(LogLevel::Warn, "track file missing", json!({"track_id": track.track_id, "path": path.display().to_string()}))?;
                continue;
            }

            let path_str = path.to_string_lossy().to_string();
            if self.store.get_book_by_path(&path_str)?.is_some() {
                skipped += 1;
                continue;
            }
            if let Ok(hash) = compute_file_hash(path) {
                if self.store.is_hash_blocked(&hash)? {
                    skipped += 1;
                    continue;
                }
            }

            self.scan_handler.process_file(ctx, path).await?;
            imported += 1;
            ctx.update_progress(i as u64 + 1, total, Some("importing"))?;
        }

        ctx.log(LogLevel::Info, "itunes import complete", json!({"imported": imported, "skipped": skipped}))?;
        ctx.flush_progress()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{OperationType, Priority};
    use crate::store::SqliteStore;
    use std::io::Write;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn write_library(dir: &std::path::Path, book_path: &std::path::Path) -> PathBuf {
        let path = dir.join("Library.xml");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Tracks</key>
    <dict>
        <key>1</key>
        <dict>
            <key>Name</key><string>Project Hail Mary</string>
            <key>Genre</key><string>Audiobook</string>
            <key>Location</key><string>file://localhost{}</string>
        </dict>
    </dict>
</dict>
</plist>"#,
            book_path.display()
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn imports_audiobook_tracks_as_books() {
        let dir = TempDir::new().unwrap();
        let book_path = dir.path().join("book.mp3");
        std::fs::write(&book_path, b"audio bytes").unwrap();
        let library_path = write_library(dir.path(), &book_path);

        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let scan_handler = ScanHandler::new(store.clone(), dir.path().to_string_lossy().to_string(), 1);
        let handler = ITunesImportHandler::new(store.clone(), scan_handler, ImportOptions { library_path });

        let op = store.create_operation(OperationType::ItunesImport, Priority::Normal).unwrap();
        let ctx = OperationContext::new(op.id, store.clone(), CancellationToken::new());
        handler.execute(&ctx).await.unwrap();

        let (_, total) = store.get_all_books(100, 0).unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn already_known_path_is_skipped() {
        let dir = TempDir::new().unwrap();
        let book_path = dir.path().join("book.mp3");
        std::fs::write(&book_path, b"audio bytes").unwrap();
        let library_path = write_library(dir.path(), &book_path);

        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());

        for _ in 0..2 {
            let handler =
                ITunesImportHandler::new(store.clone(), ScanHandler::new(store.clone(), dir.path().to_string_lossy().to_string(), 1), ImportOptions { library_path: library_path.clone() });
            let op = store.create_operation(OperationType::ItunesImport, Priority::Normal).unwrap();
            let ctx = OperationContext::new(op.id, store.clone(), CancellationToken::new());
            handler.execute(&ctx).await.unwrap();
        }

        let (_, total) = store.get_all_books(100, 0).unwrap();
        assert_eq!(total, 1);
    }
}
