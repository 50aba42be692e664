//! The `Store` trait — §4.S public operations.
//!
//! Implementations MUST provide atomic single-entity writes and prefix-scan
//! iteration. All other components interact with persisted state only
//! through this trait (§3.3: "The Store owns all entities").

use super::error::StoreResult;
use super::models::*;

pub trait Store: Send + Sync {
    // --- Books --------------------------------------------------------
    fn create_book(&self, book: &Book) -> StoreResult<()>;
    fn get_book_by_id(&self, id: &str) -> StoreResult<Option<Book>>;
    fn get_book_by_path(&self, path: &str) -> StoreResult<Option<Book>>;
    fn get_book_by_file_hash(&self, hash: &str) -> StoreResult<Option<Book>>;
    fn get_all_books(&self, limit: usize, offset: usize) -> StoreResult<(Vec<Book>, usize)>;
    fn search_books(&self, query: &str, limit: usize, offset: usize) -> StoreResult<(Vec<Book>, usize)>;
    /// MUST stamp `updated_at`; MUST advance `metadata_updated_at` iff a
    /// user-visible field changed; MUST NOT touch `last_written_at`.
    fn update_book(&self, book: &Book) -> StoreResult<Book>;
    fn soft_delete(&self, id: &str) -> StoreResult<()>;
    fn list_soft_deleted_books(&self, older_than: Option<i64>) -> StoreResult<Vec<Book>>;
    fn purge_soft_deleted(&self) -> StoreResult<usize>;
    fn restore_book(&self, id: &str) -> StoreResult<()>;
    /// Changes only `last_written_at`; every other field untouched.
    fn set_last_written_at(&self, id: &str, t: i64) -> StoreResult<()>;
    fn list_duplicates(&self) -> StoreResult<Vec<Vec<Book>>>;

    // --- Authors / narrators / series ----------------------------------
    fn get_author_by_id(&self, id: i64) -> StoreResult<Option<Author>>;
    fn get_author_by_name(&self, name: &str) -> StoreResult<Option<Author>>;
    /// Idempotent: if an author with the same case-insensitive name exists,
    /// returns the existing row.
    fn create_author(&self, name: &str) -> StoreResult<Author>;
    fn get_narrator_by_id(&self, id: i64) -> StoreResult<Option<Narrator>>;
    fn get_narrator_by_name(&self, name: &str) -> StoreResult<Option<Narrator>>;
    fn create_narrator(&self, name: &str) -> StoreResult<Narrator>;
    fn get_all_series(&self) -> StoreResult<Vec<Series>>;
    fn get_series_by_name(&self, name: &str) -> StoreResult<Option<Series>>;
    fn create_series(&self, name: &str, author_id: Option<i64>) -> StoreResult<Series>;

    // --- Junctions ------------------------------------------------------
    /// Replace semantics: existing rows removed and replaced atomically.
    fn set_book_authors(&self, book_id: &str, authors: &[BookAuthor]) -> StoreResult<()>;
    fn get_book_authors(&self, book_id: &str) -> StoreResult<Vec<BookAuthor>>;
    fn set_book_narrators(&self, book_id: &str, narrators: &[BookNarrator]) -> StoreResult<()>;
    fn get_book_narrators(&self, book_id: &str) -> StoreResult<Vec<BookNarrator>>;

    // --- Segments ---------------------------------------------------------
    fn create_segment(&self, segment: &BookSegment) -> StoreResult<()>;
    fn list_segments(&self, book_numeric_id: i64) -> StoreResult<Vec<BookSegment>>;

    // --- Provenance -------------------------------------------------------
    fn upsert_metadata_field_state(&self, state: &MetadataFieldState) -> StoreResult<()>;
    fn get_metadata_field_states(&self, book_id: &str) -> StoreResult<Vec<MetadataFieldState>>;
    fn delete_metadata_field_state(&self, book_id: &str, field: &str) -> StoreResult<()>;

    // --- History ----------------------------------------------------------
    /// Append-only; callers decide whether to record (no dedup inside the store).
    fn record_metadata_change(&self, record: &MetadataChangeRecord) -> StoreResult<()>;
    fn get_metadata_change_history(
        &self,
        book_id: &str,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<MetadataChangeRecord>>;

    // --- Operations ---------------------------------------------------------
    fn create_operation(&self, op_type: OperationType, priority: Priority) -> StoreResult<Operation>;
    fn update_operation_status(
        &self,
        id: &str,
        status: OperationStatus,
        error_message: Option<&str>,
    ) -> StoreResult<()>;
    fn update_operation_progress(
        &self,
        id: &str,
        current: u64,
        total: u64,
        label: Option<&str>,
    ) -> StoreResult<()>;
    fn get_operation(&self, id: &str) -> StoreResult<Option<Operation>>;
    fn list_operations(&self, status: Option<OperationStatus>) -> StoreResult<Vec<Operation>>;
    fn append_operation_log(&self, entry: &OperationLog) -> StoreResult<()>;
    fn get_operation_logs(&self, operation_id: &str) -> StoreResult<Vec<OperationLog>>;
    fn set_operation_aging_boosted(&self, id: &str, boosted_at: i64) -> StoreResult<()>;
    fn set_operation_priority(&self, id: &str, priority: Priority) -> StoreResult<()>;
    /// Replace semantics. Does not validate that the referenced operations
    /// exist — the queue dispatcher treats a missing dependency as satisfied.
    fn set_operation_depends_on(&self, id: &str, depends_on: &[String]) -> StoreResult<()>;

    // --- Blocked hashes / import paths / fingerprints / shadow -----------
    fn is_hash_blocked(&self, hash: &str) -> StoreResult<bool>;
    fn add_blocked_hash(&self, entry: &BlockedHash) -> StoreResult<()>;
    fn list_blocked_hashes(&self) -> StoreResult<Vec<BlockedHash>>;

    fn create_import_path(&self, path: &ImportPath) -> StoreResult<()>;
    fn list_import_paths(&self) -> StoreResult<Vec<ImportPath>>;
    fn set_import_path_book_count(&self, id: &str, count: u64) -> StoreResult<()>;

    fn get_itunes_fingerprint(&self, path: &str) -> StoreResult<Option<ITunesLibraryFingerprint>>;
    fn put_itunes_fingerprint(&self, fp: &ITunesLibraryFingerprint) -> StoreResult<()>;

    fn get_shadow_record(&self, torrent_id: &str) -> StoreResult<Option<ShadowRecord>>;
    fn put_shadow_record(&self, record: &ShadowRecord) -> StoreResult<()>;
    fn delete_shadow_record(&self, torrent_id: &str) -> StoreResult<()>;
    fn list_shadow_records(&self, status: Option<ShadowStatus>) -> StoreResult<Vec<ShadowRecord>>;

    // --- Anthology ----------------------------------------------------------
    fn create_anthology_review(&self, review: &AnthologyReview) -> StoreResult<()>;
    fn get_anthology_review(&self, id: &str) -> StoreResult<Option<AnthologyReview>>;
    fn list_anthology_reviews(&self, status: Option<AnthologyReviewStatus>) -> StoreResult<Vec<AnthologyReview>>;
    fn update_anthology_review_status(&self, id: &str, status: AnthologyReviewStatus) -> StoreResult<()>;
    fn resolve_anthology_review(
        &self,
        id: &str,
        resolution: AnthologyResolution,
        mappings: &[AnthologyBookMapping],
    ) -> StoreResult<()>;

    // --- Generic key access (checkpoint / journal / shadow overrides) -----
    fn kv_set(&self, key: &str, value: &[u8]) -> StoreResult<()>;
    fn kv_get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
    fn kv_delete(&self, key: &str) -> StoreResult<()>;
    fn kv_iterate_prefix(
        &self,
        prefix: &str,
        f: &mut dyn FnMut(&str, &[u8]) -> StoreResult<()>,
    ) -> StoreResult<()>;
}
