//! `OperationType::Organize` — §4.Q, §4.A `EnqueueOrganize`. Organises
//! every book still sitting in `LibraryState::Import`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::config::OrganizationStrategy;
use crate::operation_queue::{OperationContext, OperationError, OperationHandler};
use crate::store::models::{LibraryState, LogLevel};
use crate::store::Store;

use super::{organise_batch, OrganiseOutcome};

const PAGE_SIZE: usize = 200;

pub struct OrganiseHandler {
    store: Arc<dyn Store>,
    root_dir: String,
    folder_pattern: String,
    file_pattern: String,
    strategy: OrganizationStrategy,
    concurrency: usize,
}

impl OrganiseHandler {
    pub fn new(
        store: Arc<dyn Store>,
        root_dir: impl Into<String>,
        folder_pattern: impl Into<String>,
        file_pattern: impl Into<String>,
        strategy: OrganizationStrategy,
        concurrency: usize,
    ) -> Self {
        Self { store, root_dir: root_dir.into(), folder_pattern: folder_pattern.into(), file_pattern: file_pattern.into(), strategy, concurrency }
    }

    fn pending_books(&self) -> Result<Vec<crate::store::models::Book>, OperationError> {
        let mut pending = Vec::new();
        let mut offset = 0;
        loop {
            let (page, total) = self.store.get_all_books(PAGE_SIZE, offset)?;
            if page.is_empty() {
                break;
            }
            pending.extend(page.into_iter().filter(|b| b.library_state == LibraryState::Import));
            offset += PAGE_SIZE;
            if offset >= total {
                break;
            }
        }
        Ok(pending)
    }
}

#[async_trait]
impl OperationHandler for OrganiseHandler {
    async fn execute(&self, ctx: &OperationContext) -> Result<(), OperationError> {
        let books = self.pending_books()?;
        let total = books.len() as u64;
        ctx.update_progress(0, total, Some("scanning import state"))?;

        if books.is_empty() {
            ctx.log(LogLevel::Info, "no books awaiting organisation", json!({}))?;
            return Ok(());
        }

        ctx.bail_if_canceled()?;

        let results = organise_batch(
            self.store.clone(),
            books,
            std::path::PathBuf::from(&self.root_dir),
            self.folder_pattern.clone(),
            self.file_pattern.clone(),
            self.strategy,
            self.concurrency,
        )
        .await;

        let mut organized = 0u64;
        let mut needs_review = 0u64;
        let mut failed = 0u64;
        for result in &results {
            match result {
                Ok(OrganiseOutcome::Organized { .. }) | Ok(OrganiseOutcome::NoOp { .. }) => organized += 1,
                Ok(OrganiseOutcome::NeedsReview { book_id, reason }) => {
                    needs_review += 1;
                    ctx.log(LogLevel::Warn, "book needs review", json!({"book_id": book_id, "reason": reason}))?;
                }
                Err(e) => {
                    failed += 1;
                    ctx.log(LogLevel::Error, "organise failed", json!({"error": e.to_string()}))?;
                }
            }
        }

        ctx.update_progress(total, total, Some("done"))?;
        ctx.log(LogLevel::Info, "organise batch complete", json!({"organized": organized, "needs_review": needs_review, "failed": failed}))?;

        if failed > 0 {
            return Err(OperationError::Transient(format!("{failed} book(s) failed to organise")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{AudioFormat, Book, OperationType, Priority};
    use crate::store::SqliteStore;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn sample_book(id: &str, file_path: &str) -> Book {
        Book {
            id: id.to_string(),
            title: "Piranesi".to_string(),
            file_path: file_path.to_string(),
            format: AudioFormat::M4b,
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
            audiobook_release_year: None,
            print_year: None,
            isbn10: None,
            isbn13: None,
            publisher: None,
            language: None,
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
            release_group: None,
            created_at: 0,
            updated_at: 0,
            metadata_updated_at: None,
            last_written_at: None,
        }
    }

    #[tokio::test]
    async fn organises_every_book_in_import_state() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("incoming").join("book.m4b");
        std::fs::create_dir_all(src.parent().unwrap()).unwrap();
        std::fs::write(&src, b"audio bytes").unwrap();

        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.create_book(&sample_book("b1", src.to_str().unwrap())).unwrap();

        let handler = OrganiseHandler::new(
            store.clone(),
            dir.path().join("library").to_string_lossy().into_owned(),
            "{title}",
            "{title}",
            OrganizationStrategy::Copy,
            2,
        );

        let op = store.create_operation(OperationType::Organize, Priority::Normal).unwrap();
        let ctx = OperationContext::new(op.id, store.clone(), CancellationToken::new());
        handler.execute(&ctx).await.unwrap();

        let book = store.get_book_by_id("b1").unwrap().unwrap();
        assert_eq!(book.library_state, LibraryState::Organized);
    }

    #[tokio::test]
    async fn nothing_pending_is_a_harmless_no_op() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let handler = OrganiseHandler::new(store.clone(), dir.path().to_string_lossy().into_owned(), "{title}", "{title}", OrganizationStrategy::Copy, 2);

        let op = store.create_operation(OperationType::Organize, Priority::Normal).unwrap();
        let ctx = OperationContext::new(op.id, store.clone(), CancellationToken::new());
        handler.execute(&ctx).await.unwrap();
    }
}
