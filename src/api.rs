//! Service façade — §4.A. Every entry point a transport layer (CLI, future
//! HTTP surface) drives goes through `CatalogApi`; nothing downstream of it
//! reaches into `Store` directly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::CoreError;
use crate::history::{self, BookUpdates};
use crate::itunes::{self, LibraryStatus};
use crate::operation_queue::OperationQueue;
use crate::resolver::sources::{Candidate, MetadataSource};
use crate::resolver::{fetch_best_candidate, CircuitBreaker};
use crate::store::models::{
    AnthologyReview, AnthologyReviewStatus, AnthologyResolution, AnthologyBookMapping, Book,
    BookSegment, Operation, OperationStatus, OperationType, Priority,
};
use crate::store::{Store, StoreResult};

/// The resolved state a running process needs to serve requests: the
/// store, the operation dispatcher, configured metadata sources and their
/// breakers. Built once at startup by `core::build`.
pub struct CatalogApi {
    store: Arc<dyn Store>,
    queue: Arc<OperationQueue>,
    sources: Vec<Arc<dyn MetadataSource>>,
    breakers: HashMap<String, Arc<CircuitBreaker>>,
    config: AppConfig,
}

impl CatalogApi {
    /// `breakers` must be the same instances given to the `FetchMetadata`
    /// handler (see `core::build`) so a source tripped by a background
    /// fetch also backs off for interactive "search now" calls.
    pub fn new(
        store: Arc<dyn Store>,
        queue: Arc<OperationQueue>,
        sources: Vec<Arc<dyn MetadataSource>>,
        breakers: HashMap<String, Arc<CircuitBreaker>>,
        config: AppConfig,
    ) -> Self {
        Self { store, queue, sources, breakers, config }
    }

    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }

    // --- Books ----------------------------------------------------------

    pub fn get_book(&self, id: &str) -> StoreResult<Option<Book>> {
        self.store.get_book_by_id(id)
    }

    pub fn list_books(&self, limit: usize, offset: usize) -> StoreResult<(Vec<Book>, usize)> {
        self.store.get_all_books(limit, offset)
    }

    pub fn search_books(&self, query: &str, limit: usize, offset: usize) -> StoreResult<(Vec<Book>, usize)> {
        self.store.search_books(query, limit, offset)
    }

    pub fn list_duplicates(&self) -> StoreResult<Vec<Vec<Book>>> {
        self.store.list_duplicates()
    }

    pub fn soft_delete_book(&self, id: &str) -> StoreResult<()> {
        self.store.soft_delete(id)
    }

    pub fn restore_book(&self, id: &str) -> StoreResult<()> {
        self.store.restore_book(id)
    }

    pub fn purge_soft_deleted(&self) -> StoreResult<usize> {
        self.store.purge_soft_deleted()
    }

    pub fn list_segments(&self, book_numeric_id: i64) -> StoreResult<Vec<BookSegment>> {
        self.store.list_segments(book_numeric_id)
    }

    pub fn update_audiobook(&self, book_id: &str, updates: &BookUpdates, raw_payload: &serde_json::Value) -> Result<Book, CoreError> {
        history::update_audiobook(self.store.as_ref(), book_id, updates, raw_payload, self.now())
    }

    // --- Operations -------------------------------------------------------

    pub fn enqueue_operation(&self, op_type: OperationType, priority: Priority, depends_on: &[String]) -> StoreResult<Operation> {
        self.queue.enqueue(op_type, priority, depends_on)
    }

    pub fn get_operation(&self, id: &str) -> StoreResult<Option<Operation>> {
        self.store.get_operation(id)
    }

    pub fn list_operations(&self, status: Option<OperationStatus>) -> StoreResult<Vec<Operation>> {
        self.store.list_operations(status)
    }

    pub fn cancel_operation(&self, id: &str) -> StoreResult<()> {
        self.queue.cancel(id)
    }

    // --- Metadata resolution ------------------------------------------------

    /// `FetchMetadataCandidate` — §4.R.fetch. Synchronous callers enqueue a
    /// `FetchMetadata` operation instead; this is the direct path used by
    /// the handler and by interactive "search now" requests.
    pub async fn fetch_metadata_candidate(
        &self,
        title: &str,
        author: Option<&str>,
        series_sequence: Option<f64>,
    ) -> Result<(Candidate, f64), crate::resolver::FetchError> {
        fetch_best_candidate(&self.sources, &self.breakers, title, author, series_sequence).await
    }

    pub fn apply_metadata_candidate(&self, book_id: &str, candidate: &Candidate, fields: &[String]) -> StoreResult<Vec<String>> {
        history::apply_metadata_candidate(self.store.as_ref(), book_id, candidate, fields, self.now())
    }

    pub fn mark_no_match(&self, book_id: &str) -> StoreResult<()> {
        history::mark_no_match(self.store.as_ref(), book_id)
    }

    // --- Anthology review ---------------------------------------------------

    pub fn list_anthology_reviews(&self, status: Option<AnthologyReviewStatus>) -> StoreResult<Vec<AnthologyReview>> {
        self.store.list_anthology_reviews(status)
    }

    pub fn get_anthology_review(&self, id: &str) -> StoreResult<Option<AnthologyReview>> {
        self.store.get_anthology_review(id)
    }

    pub fn resolve_anthology_review(&self, id: &str, resolution: AnthologyResolution, mappings: &[AnthologyBookMapping]) -> StoreResult<()> {
        self.store.resolve_anthology_review(id, resolution, mappings)
    }

    pub fn restart_anthology_review(&self, id: &str) -> StoreResult<()> {
        self.store.update_anthology_review_status(id, AnthologyReviewStatus::Pending)
    }

    // --- iTunes --------------------------------------------------------------

    pub fn validate_itunes_library(&self, library_path: &Path) -> Result<itunes::ValidationReport, itunes::ITunesError> {
        itunes::validate(library_path)
    }

    pub fn enqueue_itunes_import(&self, depends_on: &[String]) -> StoreResult<Operation> {
        self.queue.enqueue(OperationType::ItunesImport, Priority::Normal, depends_on)
    }

    pub fn write_back_itunes_library(&self, library_path: &Path, options: &itunes::WriteBackOptions) -> Result<(), itunes::ITunesError> {
        itunes::write_back(self.store.as_ref(), library_path, options)
    }

    pub fn itunes_library_status(&self, change_flag: Option<&itunes::ChangeFlag>) -> Result<LibraryStatus, crate::store::StoreError> {
        itunes::library_status(self.store.as_ref(), self.config.itunes_library_path.as_deref().and_then(|p| p.to_str()), change_flag)
    }

    // --- Organisation --------------------------------------------------------

    pub fn enqueue_organise(&self, depends_on: &[String]) -> StoreResult<Operation> {
        self.queue.enqueue(OperationType::Organize, Priority::Normal, depends_on)
    }

    pub fn enqueue_scan(&self, depends_on: &[String]) -> StoreResult<Operation> {
        self.queue.enqueue(OperationType::Scan, Priority::Normal, depends_on)
    }

    pub fn enqueue_write_back(&self, book_id: &str, depends_on: &[String]) -> StoreResult<Operation> {
        let op = self.queue.enqueue(OperationType::WriteBack, Priority::Normal, depends_on)?;
        // One `WriteBackHandler` instance serves every operation of this
        // type, so the target book rides along in the kv store keyed by
        // the operation's own id rather than living on the handler.
        self.store.kv_set(&format!("writeback:book_id:{}", op.id), book_id.as_bytes())?;
        Ok(op)
    }

    pub fn enqueue_fetch_metadata(&self, book_id: &str, depends_on: &[String]) -> StoreResult<Operation> {
        let op = self.queue.enqueue(OperationType::FetchMetadata, Priority::Normal, depends_on)?;
        self.store.kv_set(&format!("fetchmetadata:book_id:{}", op.id), book_id.as_bytes())?;
        Ok(op)
    }

    pub fn root_dir(&self) -> &PathBuf {
        &self.config.root_dir
    }
}
