//! Generation-counted read-through cache for `GetAllBooks` / `SearchBooks`
//! (§4.S Cache layer).
//!
//! Every mutating `Store` method bumps a single atomic generation counter.
//! A cache entry is valid only while its stored generation matches the
//! current one; invalidation is therefore a single atomic increment rather
//! than a sweep over entries.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::error::StoreResult;
use super::models::*;
use super::trait_def::Store;

const DEFAULT_CAPACITY: usize = 1000;

#[derive(Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    All { limit: usize, offset: usize },
    Search { query: String, limit: usize, offset: usize },
}

struct Entry {
    generation: u64,
    value: (Vec<Book>, usize),
}

struct Lru {
    capacity: usize,
    order: VecDeque<CacheKey>,
    entries: HashMap<CacheKey, Entry>,
}

impl Lru {
    fn new(capacity: usize) -> Self {
        Self { capacity, order: VecDeque::new(), entries: HashMap::new() }
    }

    fn get(&mut self, key: &CacheKey, generation: u64) -> Option<(Vec<Book>, usize)> {
        let entry = self.entries.get(key)?;
        if entry.generation != generation {
            return None;
        }
        let value = entry.value.clone();
        self.touch(key);
        Some(value)
    }

    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push_back(key.clone());
    }

    fn put(&mut self, key: CacheKey, generation: u64, value: (Vec<Book>, usize)) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.touch(&key);
        self.entries.insert(key, Entry { generation, value });
    }
}

/// Wraps any [`Store`] implementation with a generation-invalidated read
/// cache for the two hot list paths. All other methods pass through.
pub struct CachedStore<S: Store> {
    inner: S,
    generation: AtomicU64,
    cache: Mutex<Lru>,
}

impl<S: Store> CachedStore<S> {
    pub fn new(inner: S) -> Self {
        Self::with_capacity(inner, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(inner: S, capacity: usize) -> Self {
        Self { inner, generation: AtomicU64::new(0), cache: Mutex::new(Lru::new(capacity)) }
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl<S: Store> Store for CachedStore<S> {
    fn create_book(&self, book: &Book) -> StoreResult<()> {
        let r = self.inner.create_book(book);
        self.bump();
        r
    }

    fn get_book_by_id(&self, id: &str) -> StoreResult<Option<Book>> {
        self.inner.get_book_by_id(id)
    }

    fn get_book_by_path(&self, path: &str) -> StoreResult<Option<Book>> {
        self.inner.get_book_by_path(path)
    }

    fn get_book_by_file_hash(&self, hash: &str) -> StoreResult<Option<Book>> {
        self.inner.get_book_by_file_hash(hash)
    }

    fn get_all_books(&self, limit: usize, offset: usize) -> StoreResult<(Vec<Book>, usize)> {
        let key = CacheKey::All { limit, offset };
        let generation = self.current_generation();
        if let Some(hit) = self.cache.lock().unwrap().get(&key, generation) {
            return Ok(hit);
        }
        let value = self.inner.get_all_books(limit, offset)?;
        self.cache.lock().unwrap().put(key, generation, value.clone());
        Ok(value)
    }

    fn search_books(&self, query: &str, limit: usize, offset: usize) -> StoreResult<(Vec<Book>, usize)> {
        let key = CacheKey::Search { query: query.to_owned(), limit, offset };
        let generation = self.current_generation();
        if let Some(hit) = self.cache.lock().unwrap().get(&key, generation) {
            return Ok(hit);
        }
        let value = self.inner.search_books(query, limit, offset)?;
        self.cache.lock().unwrap().put(key, generation, value.clone());
        Ok(value)
    }

    fn update_book(&self, book: &Book) -> StoreResult<Book> {
        let r = self.inner.update_book(book);
        self.bump();
        r
    }

    fn soft_delete(&self, id: &str) -> StoreResult<()> {
        let r = self.inner.soft_delete(id);
        self.bump();
        r
    }

    fn list_soft_deleted_books(&self, older_than: Option<i64>) -> StoreResult<Vec<Book>> {
        self.inner.list_soft_deleted_books(older_than)
    }

    fn purge_soft_deleted(&self) -> StoreResult<usize> {
        let r = self.inner.purge_soft_deleted();
        self.bump();
        r
    }

    fn restore_book(&self, id: &str) -> StoreResult<()> {
        let r = self.inner.restore_book(id);
        self.bump();
        r
    }

    fn set_last_written_at(&self, id: &str, t: i64) -> StoreResult<()> {
        self.inner.set_last_written_at(id, t)
    }

    fn list_duplicates(&self) -> StoreResult<Vec<Vec<Book>>> {
        self.inner.list_duplicates()
    }

    fn get_author_by_id(&self, id: i64) -> StoreResult<Option<Author>> {
        self.inner.get_author_by_id(id)
    }

    fn get_author_by_name(&self, name: &str) -> StoreResult<Option<Author>> {
        self.inner.get_author_by_name(name)
    }

    fn create_author(&self, name: &str) -> StoreResult<Author> {
        self.inner.create_author(name)
    }

    fn get_narrator_by_id(&self, id: i64) -> StoreResult<Option<Narrator>> {
        self.inner.get_narrator_by_id(id)
    }

    fn get_narrator_by_name(&self, name: &str) -> StoreResult<Option<Narrator>> {
        self.inner.get_narrator_by_name(name)
    }

    fn create_narrator(&self, name: &str) -> StoreResult<Narrator> {
        self.inner.create_narrator(name)
    }

    fn get_all_series(&self) -> StoreResult<Vec<Series>> {
        self.inner.get_all_series()
    }

    fn get_series_by_name(&self, name: &str) -> StoreResult<Option<Series>> {
        self.inner.get_series_by_name(name)
    }

    fn create_series(&self, name: &str, author_id: Option<i64>) -> StoreResult<Series> {
        self.inner.create_series(name, author_id)
    }

    fn set_book_authors(&self, book_id: &str, authors: &[BookAuthor]) -> StoreResult<()> {
        let r = self.inner.set_book_authors(book_id, authors);
        self.bump();
        r
    }

    fn get_book_authors(&self, book_id: &str) -> StoreResult<Vec<BookAuthor>> {
        self.inner.get_book_authors(book_id)
    }

    fn set_book_narrators(&self, book_id: &str, narrators: &[BookNarrator]) -> StoreResult<()> {
        let r = self.inner.set_book_narrators(book_id, narrators);
        self.bump();
        r
    }

    fn get_book_narrators(&self, book_id: &str) -> StoreResult<Vec<BookNarrator>> {
        self.inner.get_book_narrators(book_id)
    }

    fn create_segment(&self, segment: &BookSegment) -> StoreResult<()> {
        let r = self.inner.create_segment(segment);
        self.bump();
        r
    }

    fn list_segments(&self, book_numeric_id: i64) -> StoreResult<Vec<BookSegment>> {
        self.inner.list_segments(book_numeric_id)
    }

    fn upsert_metadata_field_state(&self, state: &MetadataFieldState) -> StoreResult<()> {
        self.inner.upsert_metadata_field_state(state)
    }

    fn get_metadata_field_states(&self, book_id: &str) -> StoreResult<Vec<MetadataFieldState>> {
        self.inner.get_metadata_field_states(book_id)
    }

    fn delete_metadata_field_state(&self, book_id: &str, field: &str) -> StoreResult<()> {
        self.inner.delete_metadata_field_state(book_id, field)
    }

    fn record_metadata_change(&self, record: &MetadataChangeRecord) -> StoreResult<()> {
        self.inner.record_metadata_change(record)
    }

    fn get_metadata_change_history(
        &self,
        book_id: &str,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<MetadataChangeRecord>> {
        self.inner.get_metadata_change_history(book_id, limit, offset)
    }

    fn create_operation(&self, op_type: OperationType, priority: Priority) -> StoreResult<Operation> {
        self.inner.create_operation(op_type, priority)
    }

    fn update_operation_status(
        &self,
        id: &str,
        status: OperationStatus,
        error_message: Option<&str>,
    ) -> StoreResult<()> {
        self.inner.update_operation_status(id, status, error_message)
    }

    fn update_operation_progress(
        &self,
        id: &str,
        current: u64,
        total: u64,
        label: Option<&str>,
    ) -> StoreResult<()> {
        self.inner.update_operation_progress(id, current, total, label)
    }

    fn get_operation(&self, id: &str) -> StoreResult<Option<Operation>> {
        self.inner.get_operation(id)
    }

    fn list_operations(&self, status: Option<OperationStatus>) -> StoreResult<Vec<Operation>> {
        self.inner.list_operations(status)
    }

    fn append_operation_log(&self, entry: &OperationLog) -> StoreResult<()> {
        self.inner.append_operation_log(entry)
    }

    fn get_operation_logs(&self, operation_id: &str) -> StoreResult<Vec<OperationLog>> {
        self.inner.get_operation_logs(operation_id)
    }

    fn set_operation_aging_boosted(&self, id: &str, boosted_at: i64) -> StoreResult<()> {
        self.inner.set_operation_aging_boosted(id, boosted_at)
    }

    fn set_operation_depends_on(&self, id: &str, depends_on: &[String]) -> StoreResult<()> {
        self.inner.set_operation_depends_on(id, depends_on)
    }

    fn set_operation_priority(&self, id: &str, priority: Priority) -> StoreResult<()> {
        self.inner.set_operation_priority(id, priority)
    }

    fn is_hash_blocked(&self, hash: &str) -> StoreResult<bool> {
        self.inner.is_hash_blocked(hash)
    }

    fn add_blocked_hash(&self, entry: &BlockedHash) -> StoreResult<()> {
        self.inner.add_blocked_hash(entry)
    }

    fn list_blocked_hashes(&self) -> StoreResult<Vec<BlockedHash>> {
        self.inner.list_blocked_hashes()
    }

    fn create_import_path(&self, path: &ImportPath) -> StoreResult<()> {
        self.inner.create_import_path(path)
    }

    fn list_import_paths(&self) -> StoreResult<Vec<ImportPath>> {
        self.inner.list_import_paths()
    }

    fn set_import_path_book_count(&self, id: &str, count: u64) -> StoreResult<()> {
        self.inner.set_import_path_book_count(id, count)
    }

    fn get_itunes_fingerprint(&self, path: &str) -> StoreResult<Option<ITunesLibraryFingerprint>> {
        self.inner.get_itunes_fingerprint(path)
    }

    fn put_itunes_fingerprint(&self, fp: &ITunesLibraryFingerprint) -> StoreResult<()> {
        self.inner.put_itunes_fingerprint(fp)
    }

    fn get_shadow_record(&self, torrent_id: &str) -> StoreResult<Option<ShadowRecord>> {
        self.inner.get_shadow_record(torrent_id)
    }

    fn put_shadow_record(&self, record: &ShadowRecord) -> StoreResult<()> {
        self.inner.put_shadow_record(record)
    }

    fn delete_shadow_record(&self, torrent_id: &str) -> StoreResult<()> {
        self.inner.delete_shadow_record(torrent_id)
    }

    fn list_shadow_records(&self, status: Option<ShadowStatus>) -> StoreResult<Vec<ShadowRecord>> {
        self.inner.list_shadow_records(status)
    }

    fn create_anthology_review(&self, review: &AnthologyReview) -> StoreResult<()> {
        self.inner.create_anthology_review(review)
    }

    fn get_anthology_review(&self, id: &str) -> StoreResult<Option<AnthologyReview>> {
        self.inner.get_anthology_review(id)
    }

    fn list_anthology_reviews(&self, status: Option<AnthologyReviewStatus>) -> StoreResult<Vec<AnthologyReview>> {
        self.inner.list_anthology_reviews(status)
    }

    fn update_anthology_review_status(&self, id: &str, status: AnthologyReviewStatus) -> StoreResult<()> {
        self.inner.update_anthology_review_status(id, status)
    }

    fn resolve_anthology_review(
        &self,
        id: &str,
        resolution: AnthologyResolution,
        mappings: &[AnthologyBookMapping],
    ) -> StoreResult<()> {
        let r = self.inner.resolve_anthology_review(id, resolution, mappings);
        self.bump();
        r
    }

    fn kv_set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.inner.kv_set(key, value)
    }

    fn kv_get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.inner.kv_get(key)
    }

    fn kv_delete(&self, key: &str) -> StoreResult<()> {
        self.inner.kv_delete(key)
    }

    fn kv_iterate_prefix(
        &self,
        prefix: &str,
        f: &mut dyn FnMut(&str, &[u8]) -> StoreResult<()>,
    ) -> StoreResult<()> {
        self.inner.kv_iterate_prefix(prefix, f)
    }
}
