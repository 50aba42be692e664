//! `OperationType::FetchMetadata` — §4.Q, §4.A `EnqueueFetchMetadata`.
//! Drives the fetch cascade for one book and applies whatever it finds
//! through the same provenance path a manual apply uses.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::operation_queue::{OperationContext, OperationError, OperationHandler};
use crate::store::models::{ChangeType, LogLevel, MetadataReviewStatus, MetadataSource as ChangeSource};
use crate::store::Store;

use super::apply::apply_candidate;
use super::circuit_breaker::CircuitBreaker;
use super::fetch::{fetch_best_candidate, FetchError};
use super::sources::MetadataSource;

pub struct FetchMetadataHandler {
    store: Arc<dyn Store>,
    sources: Vec<Arc<dyn MetadataSource>>,
    breakers: HashMap<String, Arc<CircuitBreaker>>,
}

impl FetchMetadataHandler {
    pub fn new(store: Arc<dyn Store>, sources: Vec<Arc<dyn MetadataSource>>, breakers: HashMap<String, Arc<CircuitBreaker>>) -> Self {
        Self { store, sources, breakers }
    }
}

/// Mirrors `writeback::target_book_id` — one handler instance serves every
/// `FetchMetadata` operation, so the target book rides in the kv store
/// under the operation's id (see `CatalogApi::enqueue_fetch_metadata`).
fn target_book_id(store: &dyn Store, ctx: &OperationContext) -> Result<String, OperationError> {
    let key = format!("fetchmetadata:book_id:{}", ctx.operation_id);
    let raw = store.kv_get(&key)?.ok_or_else(|| OperationError::NotFound(format!("no book recorded for operation {}", ctx.operation_id)))?;
    String::from_utf8(raw).map_err(|e| OperationError::Other(e.into()))
}

#[async_trait]
impl OperationHandler for FetchMetadataHandler {
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

        let now = chrono::Utc::now().timestamp();

        match fetch_best_candidate(&self.sources, &self.breakers, &book.title, author_name.as_deref(), book.series_sequence).await {
            Ok((candidate, score)) => {
                let applied = apply_candidate(self.store.as_ref(), &book_id, &candidate, &[], ChangeSource::Fetched, ChangeType::Fetch, now)?;

                let mut updated = self.store.get_book_by_id(&book_id)?.ok_or_else(|| OperationError::NotFound(book_id.clone()))?;
                updated.metadata_review_status = Some(MetadataReviewStatus::Matched);
                self.store.update_book(&updated)?;

                ctx.log(LogLevel::Info, "metadata fetch matched", json!({"score": score, "source": candidate.source, "fields_applied": applied}))?;
            }
            Err(FetchError::NoMatch { .. }) => {
                let mut updated = book.clone();
                updated.metadata_review_status = Some(MetadataReviewStatus::NoMatch);
                self.store.update_book(&updated)?;
                ctx.log(LogLevel::Info, "metadata fetch found no match", json!({}))?;
            }
        }

        ctx.update_progress(1, 1, Some("done"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::sources::{Candidate, SourceError};
    use crate::store::models::{AudioFormat, Book, LibraryState, OperationType, Priority};
    use crate::store::SqliteStore;
    use tokio_util::sync::CancellationToken;

    struct StubSource {
        candidates: Vec<Candidate>,
    }

    #[async_trait]
    impl MetadataSource for StubSource {
        fn name(&self) -> &str {
            "stub"
        }
        async fn search_by_title(&self, _title: &str) -> Result<Vec<Candidate>, SourceError> {
            Ok(self.candidates.clone())
        }
        async fn search_by_title_and_author(&self, _title: &str, _author: &str) -> Result<Vec<Candidate>, SourceError> {
            Ok(self.candidates.clone())
        }
        async fn search_by_author(&self, _author: &str) -> Result<Vec<Candidate>, SourceError> {
            Ok(vec![])
        }
    }

    fn sample_book(id: &str, title: &str) -> Book {
        Book {
            id: id.to_string(),
            title: title.to_string(),
            file_path: format!("/library/{id}.mp3"),
            format: AudioFormat::Mp3,
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
    async fn a_clean_match_updates_the_book_and_marks_it_matched() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.create_book(&sample_book("b1", "The Long Cosmos")).unwrap();

        let candidate = Candidate {
            source: "stub".to_string(),
            title: "The Long Cosmos".to_string(),
            author: Some("Terry Pratchett".to_string()),
            narrator: None,
            publisher: None,
            language: None,
            isbn10: None,
            isbn13: None,
            audiobook_release_year: Some(2016),
            print_year: None,
            cover_url: None,
            description: None,
            series_name: None,
            series_position: None,
        };
        let source: Arc<dyn MetadataSource> = Arc::new(StubSource { candidates: vec![candidate] });
        let handler = FetchMetadataHandler::new(store.clone(), vec![source], HashMap::new());

        let op = store.create_operation(OperationType::FetchMetadata, Priority::Normal).unwrap();
        store.kv_set(&format!("fetchmetadata:book_id:{}", op.id), b"b1").unwrap();
        let ctx = OperationContext::new(op.id, store.clone(), CancellationToken::new());
        handler.execute(&ctx).await.unwrap();

        let book = store.get_book_by_id("b1").unwrap().unwrap();
        assert_eq!(book.metadata_review_status, Some(MetadataReviewStatus::Matched));
    }

    #[tokio::test]
    async fn no_candidates_marks_the_book_no_match_without_failing_the_operation() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.create_book(&sample_book("b1", "Some Unknown Title")).unwrap();

        let source: Arc<dyn MetadataSource> = Arc::new(StubSource { candidates: vec![] });
        let handler = FetchMetadataHandler::new(store.clone(), vec![source], HashMap::new());

        let op = store.create_operation(OperationType::FetchMetadata, Priority::Normal).unwrap();
        store.kv_set(&format!("fetchmetadata:book_id:{}", op.id), b"b1").unwrap();
        let ctx = OperationContext::new(op.id, store.clone(), CancellationToken::new());
        handler.execute(&ctx).await.unwrap();

        let book = store.get_book_by_id("b1").unwrap().unwrap();
        assert_eq!(book.metadata_review_status, Some(MetadataReviewStatus::NoMatch));
    }
}
