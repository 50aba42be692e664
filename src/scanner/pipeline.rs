//! Stage 2: per-file processing and the `ScanHandler` operation — §4.N.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::book_graph::{resolve_book_authors, resolve_book_narrators};
use crate::file_ops::compute_file_hash;
use crate::metadata;
use crate::operation_queue::{OperationContext, OperationError, OperationHandler};
use crate::resolver::anthology;
use crate::store::models::{
    AudioFormat, Book, LibraryState, LogLevel, Series,
};
use crate::store::Store;

use super::checkpoint::{self, ScanCheckpoint};
use super::discovery::discover_files;
use super::release_group::detect_release_group;

/// Third-party AI filename-parsing client contract. The concrete
/// implementation (HTTP calls, prompt construction, API keys) lives
/// outside this repo; only the contract matters here.
#[async_trait]
pub trait AiFilenameParser: Send + Sync {
    /// Returns best-effort guesses for fields the embedded/filename parser
    /// left empty. Implementations must not overwrite fields the caller
    /// already has confident values for — that merge policy is enforced
    /// by the caller, not the parser.
    async fn parse(&self, filename: &str) -> Result<AiFilenameGuess, OperationError>;
}

#[derive(Debug, Clone, Default)]
pub struct AiFilenameGuess {
    pub title: Option<String>,
    pub author: Option<String>,
    pub series: Option<String>,
    pub series_sequence: Option<f64>,
}

const CHECKPOINT_DIR_INTERVAL: usize = 100;

pub struct ScanHandler {
    store: Arc<dyn Store>,
    root_dir: String,
    concurrent_scans: usize,
    ai_parser: Option<Arc<dyn AiFilenameParser>>,
}

impl ScanHandler {
    pub fn new(store: Arc<dyn Store>, root_dir: impl Into<String>, concurrent_scans: usize) -> Self {
        Self { store, root_dir: root_dir.into(), concurrent_scans, ai_parser: None }
    }

    pub fn with_ai_parser(mut self, parser: Arc<dyn AiFilenameParser>) -> Self {
        self.ai_parser = Some(parser);
        self
    }

    /// Shared per-file processing entry point, also used by the iTunes
    /// importer (§4.I) to dedupe/ingest audiobook tracks the same way a
    /// filesystem scan would.
    pub async fn process_file(&self, ctx: &OperationContext, path: &Path) -> Result<(), OperationError> {
        self.process_one(ctx, path).await
    }

    async fn process_one(&self, ctx: &OperationContext, path: &Path) -> Result<(), OperationError> {
        let hash = compute_file_hash(path).map_err(|e| OperationError::Other(e.into()))?;

        if self.store.is_hash_blocked(&hash)? {
            ctx.log(LogLevel::Debug, "skipping blocked hash", json!({"path": path.display().to_string()}))?;
            return Ok(());
        }

        let path_str = path.to_string_lossy().to_string();
        if let Some(existing) = self.store.get_book_by_path(&path_str)? {
            if existing.file_hash.as_deref() == Some(hash.as_str()) {
                return Ok(());
            }
        }
        if let Some(existing) = self.store.get_book_by_file_hash(&hash)? {
            if existing.file_path != path_str {
                ctx.log(
                    LogLevel::Info,
                    "duplicate content hash at a new path",
                    json!({"existing_path": existing.file_path, "new_path": path_str}),
                )?;
            }
        }

        let extracted = metadata::extract(path).map_err(|e| OperationError::Other(e.into()))?;
        let mut tags = extracted.tags;

        if tags.title.is_none() || tags.artist.is_none() {
            if let Some(parser) = &self.ai_parser {
                let filename = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
                if let Ok(guess) = parser.parse(filename).await {
                    if tags.title.is_none() {
                        tags.title = guess.title;
                    }
                    if tags.artist.is_none() {
                        tags.artist = guess.author;
                    }
                    if tags.series.is_none() {
                        tags.series = guess.series;
                    }
                    if tags.series_index.is_none() {
                        tags.series_index = guess.series_sequence;
                    }
                }
            }
        }

        let now = chrono::Utc::now().timestamp();
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(AudioFormat::from_extension)
            .unwrap_or(AudioFormat::Mp3);

        let file_size = std::fs::metadata(path).map(|m| m.len()).ok();
        let title = tags.title.clone().unwrap_or_else(|| {
            path.file_stem().and_then(|s| s.to_str()).unwrap_or("Unknown").to_string()
        });

        let series_id = match &tags.series {
            Some(name) => Some(self.store.create_series(name, None)?.id),
            None => None,
        };

        let book_id = uuid::Uuid::new_v4().to_string();
        let book = Book {
            id: book_id.clone(),
            title,
            file_path: path_str,
            format,
            duration_sec: tags.duration_sec,
            file_hash: Some(hash.clone()),
            file_size,
            bitrate_kbps: extracted.media_info.bitrate_kbps,
            codec: extracted.media_info.codec.clone(),
            sample_rate_hz: extracted.media_info.sample_rate_hz,
            channels: extracted.media_info.channels,
            author_id: None,
            narrator: tags.narrator.clone(),
            series_id,
            series_sequence: tags.series_index,
            audiobook_release_year: tags.year,
            print_year: None,
            isbn10: tags.isbn10.clone(),
            isbn13: tags.isbn13.clone(),
            publisher: tags.publisher.clone(),
            language: tags.language.clone(),
            cover_url: None,
            narrators_json: None,
            library_state: LibraryState::Import,
            marked_for_deletion: false,
            marked_for_deletion_at: None,
            version_group_id: None,
            is_primary_version: true,
            superseded_by: None,
            is_anthology: false,
            metadata_review_status: None,
            release_group: path.file_stem().and_then(|s| s.to_str()).and_then(detect_release_group),
            created_at: now,
            updated_at: now,
            metadata_updated_at: Some(now),
            last_written_at: None,
        };

        self.store.create_book(&book)?;

        if let Some(author_name) = &tags.artist {
            resolve_book_authors(self.store.as_ref(), &book_id, author_name)?;
        }
        if let Some(narrator_name) = &tags.narrator {
            resolve_book_narrators(self.store.as_ref(), &book_id, narrator_name)?;
        }

        self.run_anthology_detection(ctx, &book)?;

        Ok(())
    }

    /// Known ISBN prefixes and series-average duration are not yet
    /// queryable from the store (no sibling-by-series or aggregate-duration
    /// accessor exists), so those two signals are always fed empty/`None`
    /// here; only the title-pattern signal can currently fire.
    fn run_anthology_detection(&self, ctx: &OperationContext, book: &Book) -> Result<(), OperationError> {
        let series_list: Vec<Series> = self.store.get_all_series()?;
        let known_isbn_prefixes: Vec<String> = Vec::new();
        let series_average_duration_sec: Option<f64> = None;

        if let Some((status, signals)) = anthology::detect_signals(
            &book.title,
            book.isbn13.as_deref(),
            &known_isbn_prefixes,
            &series_list,
            book.duration_sec,
            series_average_duration_sec,
        ) {
            let review = crate::store::models::AnthologyReview {
                id: uuid::Uuid::new_v4().to_string(),
                book_id: book.id.clone(),
                status,
                resolution: None,
                detected_signals: signals.iter().map(|s| s.name.to_string()).collect(),
                created_at: book.created_at,
                times_out_at: Some(anthology::times_out_at(book.created_at)),
            };
            self.store.create_anthology_review(&review)?;
            ctx.log(
                LogLevel::Info,
                "anthology signals detected",
                json!({"book_id": book.id, "signals": review.detected_signals}),
            )?;
        }
        Ok(())
    }
}

#[async_trait]
impl OperationHandler for ScanHandler {
    async fn execute(&self, ctx: &OperationContext) -> Result<(), OperationError> {
        let root = Path::new(&self.root_dir);
        let files = discover_files(root, self.concurrent_scans)
            .map_err(|e| OperationError::Other(e.into()))?;

        let total = files.len() as u64;
        let mut checkpoint = checkpoint::load(self.store.as_ref(), &ctx.operation_id)?
            .unwrap_or_else(|| ScanCheckpoint::new(ctx.operation_id.clone(), self.root_dir.clone(), Vec::new()));

        for (i, path) in files.iter().enumerate() {
            ctx.bail_if_canceled()?;

            let dir = path.parent().and_then(|p| p.to_str()).unwrap_or("").to_string();
            if checkpoint.scanned_dirs.contains(&dir) {
                continue;
            }

            self.process_one(ctx, path).await?;
            ctx.update_progress(i as u64 + 1, total, Some("scanning"))?;

            if (i + 1) % CHECKPOINT_DIR_INTERVAL == 0 {
                checkpoint.mark_scanned(&dir, chrono::Utc::now().timestamp());
                checkpoint.books_found += 1;
                checkpoint::save(self.store.as_ref(), &checkpoint)?;
            }
        }

        ctx.flush_progress()?;
        checkpoint::clear(self.store.as_ref(), &ctx.operation_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{OperationType, Priority};
    use crate::store::SqliteStore;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn write_mp3(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"not really an mp3 but has bytes").unwrap();
    }

    #[tokio::test]
    async fn scans_a_directory_and_creates_books() {
        let dir = TempDir::new().unwrap();
        write_mp3(&dir.path().join("Author - Title.mp3"));
        write_mp3(&dir.path().join("Author - Other.mp3"));

        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let op = store.create_operation(OperationType::Scan, Priority::Normal).unwrap();
        let ctx = OperationContext::new(op.id, store.clone(), CancellationToken::new());

        let handler = ScanHandler::new(store.clone(), dir.path().to_string_lossy().to_string(), 2);
        handler.execute(&ctx).await.unwrap();

        let (books, total) = store.get_all_books(100, 0).unwrap();
        assert_eq!(total, 2);
        assert!(books.iter().any(|b| b.title == "Title"));
    }

    #[tokio::test]
    async fn blocked_hash_is_skipped() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("Author - Title.mp3");
        write_mp3(&file);

        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let hash = compute_file_hash(&file).unwrap();
        store
            .add_blocked_hash(&crate::store::models::BlockedHash {
                hash,
                reason: "test".to_string(),
                created_at: 0,
            })
            .unwrap();

        let op = store.create_operation(OperationType::Scan, Priority::Normal).unwrap();
        let ctx = OperationContext::new(op.id, store.clone(), CancellationToken::new());
        let handler = ScanHandler::new(store.clone(), dir.path().to_string_lossy().to_string(), 2);
        handler.execute(&ctx).await.unwrap();

        let (_, total) = store.get_all_books(100, 0).unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn resuming_with_a_checkpoint_skips_already_scanned_directories() {
        let dir = TempDir::new().unwrap();
        let done_dir = dir.path().join("done");
        let pending_dir = dir.path().join("pending");
        write_mp3(&done_dir.join("Author - Finished.mp3"));
        write_mp3(&pending_dir.join("Author - Unfinished.mp3"));

        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let op = store.create_operation(OperationType::Scan, Priority::Normal).unwrap();

        let mut checkpoint = ScanCheckpoint::new(op.id.clone(), dir.path().to_string_lossy().to_string(), Vec::new());
        checkpoint.mark_scanned(&done_dir.to_string_lossy(), 0);
        checkpoint::save(store.as_ref(), &checkpoint).unwrap();

        let ctx = OperationContext::new(op.id, store.clone(), CancellationToken::new());
        let handler = ScanHandler::new(store.clone(), dir.path().to_string_lossy().to_string(), 2);
        handler.execute(&ctx).await.unwrap();

        let (books, total) = store.get_all_books(100, 0).unwrap();
        assert_eq!(total, 1);
        assert!(books.iter().any(|b| b.title == "Unfinished"));
        assert!(!books.iter().any(|b| b.title == "Finished"));
    }

    #[tokio::test]
    async fn rescanning_an_unchanged_file_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        write_mp3(&dir.path().join("Author - Title.mp3"));

        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let handler = ScanHandler::new(store.clone(), dir.path().to_string_lossy().to_string(), 2);

        for _ in 0..2 {
            let op = store.create_operation(OperationType::Scan, Priority::Normal).unwrap();
            let ctx = OperationContext::new(op.id, store.clone(), CancellationToken::new());
            handler.execute(&ctx).await.unwrap();
        }

        let (_, total) = store.get_all_books(100, 0).unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn cancellation_stops_processing_further_files() {
        let dir = TempDir::new().unwrap();
        write_mp3(&dir.path().join("Author - Title.mp3"));

        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let op = store.create_operation(OperationType::Scan, Priority::Normal).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let ctx = OperationContext::new(op.id, store.clone(), token);

        let handler = ScanHandler::new(store.clone(), dir.path().to_string_lossy().to_string(), 2);
        let result = handler.execute(&ctx).await;
        assert!(matches!(result, Err(OperationError::Canceled)));
    }

    #[tokio::test]
    async fn title_pattern_trips_anthology_review() {
        let dir = TempDir::new().unwrap();
        write_mp3(&dir.path().join("Author - The Complete Collection.mp3"));

        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let op = store.create_operation(OperationType::Scan, Priority::Normal).unwrap();
        let ctx = OperationContext::new(op.id, store.clone(), CancellationToken::new());
        let handler = ScanHandler::new(store.clone(), dir.path().to_string_lossy().to_string(), 2);
        handler.execute(&ctx).await.unwrap();

        let reviews = store.list_anthology_reviews(None).unwrap();
        assert_eq!(reviews.len(), 1);
    }
}
