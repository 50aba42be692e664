//! History & provenance orchestration — §4.H. `resolver::apply` owns the
//! per-field provenance mechanics (effective-value coalescing, override
//! locking, change-record dedup); this module wires the book-level entry
//! points that drive it: manual edits, AI-parse merges, and the
//! apply-metadata-candidate path.

use tracing::debug;

use crate::book_graph::{resolve_book_authors, resolve_book_narrators};
use crate::error::CoreError;
use crate::resolver::apply::apply_candidate;
use crate::resolver::sources::Candidate;
use crate::store::error::StoreResult;
use crate::store::models::{
    Book, ChangeType, MetadataChangeRecord, MetadataReviewStatus, MetadataSource as ChangeSource,
};
use crate::store::Store;

/// Sparse set of user-editable fields. `None` leaves a field untouched;
/// this is distinct from clearing it, which callers express with
/// `Some(String::new())` the same way the store treats empty strings.
#[derive(Debug, Clone, Default)]
pub struct BookUpdates {
    pub title: Option<String>,
    pub author: Option<String>,
    pub narrator: Option<String>,
    pub series: Option<String>,
    pub series_sequence: Option<f64>,
    pub publisher: Option<String>,
    pub language: Option<String>,
    pub isbn10: Option<String>,
    pub isbn13: Option<String>,
    pub audiobook_release_year: Option<i32>,
    pub print_year: Option<i32>,
}

fn record_if_changed(
    store: &dyn Store,
    book_id: &str,
    field: &str,
    previous: Option<String>,
    new: Option<String>,
    now: i64,
) -> StoreResult<bool> {
    if previous == new {
        return Ok(false);
    }
    store.record_metadata_change(&MetadataChangeRecord {
        book_id: book_id.to_string(),
        field: field.to_string(),
        previous_value: previous,
        new_value: new,
        source: ChangeSource::Manual,
        change_type: ChangeType::UserEdit,
        changed_at: now,
    })?;
    Ok(true)
}

/// `UpdateAudiobook(id, updates, raw_payload)` — §4.A. The single entry
/// point for manual edits, AI-parse merges, and metadata-apply fallout:
/// splits `&`-joined author/narrator names into junction rows, records a
/// history entry per field that actually changed, and persists the book
/// in one write. `raw_payload` is accepted for parity with the transport
/// contract and logged at debug level; no column stores it verbatim.
pub fn update_audiobook(store: &dyn Store, book_id: &str, updates: &BookUpdates, raw_payload: &serde_json::Value, now: i64) -> Result<Book, CoreError> {
    debug!(book_id, payload_keys = ?raw_payload.as_object().map(|o| o.keys().collect::<Vec<_>>()), "update_audiobook");

    let mut book = store
        .get_book_by_id(book_id)?
        .ok_or_else(|| CoreError::NotFound(format!("book {book_id}")))?;

    if let Some(title) = &updates.title {
        record_if_changed(store, book_id, "title", Some(book.title.clone()), Some(title.clone()), now)?;
        book.title = title.clone();
    }
    if let Some(author) = &updates.author {
        record_if_changed(store, book_id, "author", None, Some(author.clone()), now)?;
        resolve_book_authors(store, book_id, author)?;
    }
    if let Some(narrator) = &updates.narrator {
        record_if_changed(store, book_id, "narrator", book.narrator.clone(), Some(narrator.clone()), now)?;
        resolve_book_narrators(store, book_id, narrator)?;
        book.narrator = Some(narrator.clone());
    }
    if let Some(series) = &updates.series {
        let series_row = store.create_series(series, book.author_id)?;
        record_if_changed(store, book_id, "series_id", book.series_id.map(|i| i.to_string()), Some(series_row.id.to_string()), now)?;
        book.series_id = Some(series_row.id);
    }
    if let Some(seq) = updates.series_sequence {
        record_if_changed(store, book_id, "series_sequence", book.series_sequence.map(|v| v.to_string()), Some(seq.to_string()), now)?;
        book.series_sequence = Some(seq);
    }
    if let Some(publisher) = &updates.publisher {
        record_if_changed(store, book_id, "publisher", book.publisher.clone(), Some(publisher.clone()), now)?;
        book.publisher = Some(publisher.clone());
    }
    if let Some(language) = &updates.language {
        record_if_changed(store, book_id, "language", book.language.clone(), Some(language.clone()), now)?;
        book.language = Some(language.clone());
    }
    if let Some(isbn10) = &updates.isbn10 {
        record_if_changed(store, book_id, "isbn10", book.isbn10.clone(), Some(isbn10.clone()), now)?;
        book.isbn10 = Some(isbn10.clone());
    }
    if let Some(isbn13) = &updates.isbn13 {
        record_if_changed(store, book_id, "isbn13", book.isbn13.clone(), Some(isbn13.clone()), now)?;
        book.isbn13 = Some(isbn13.clone());
    }
    if let Some(year) = updates.audiobook_release_year {
        record_if_changed(store, book_id, "audiobook_release_year", book.audiobook_release_year.map(|v| v.to_string()), Some(year.to_string()), now)?;
        book.audiobook_release_year = Some(year);
    }
    if let Some(year) = updates.print_year {
        record_if_changed(store, book_id, "print_year", book.print_year.map(|v| v.to_string()), Some(year.to_string()), now)?;
        book.print_year = Some(year);
    }

    Ok(store.update_book(&book)?)
}

/// `ApplyMetadataCandidate(book_id, candidate, fields?)` — §4.R.applyManual.
/// Shares `resolver::apply::apply_candidate`'s downgrade protection
/// (locked overrides are never touched); on success marks the book
/// reviewed.
pub fn apply_metadata_candidate(store: &dyn Store, book_id: &str, candidate: &Candidate, fields: &[String], now: i64) -> StoreResult<Vec<String>> {
    let applied = apply_candidate(store, book_id, candidate, fields, ChangeSource::Manual, ChangeType::UserEdit, now)?;

    if let Some(mut book) = store.get_book_by_id(book_id)? {
        book.metadata_review_status = Some(MetadataReviewStatus::Matched);
        store.update_book(&book)?;
    }
    Ok(applied)
}

/// `MarkNoMatch(book_id)` — §4.A.
pub fn mark_no_match(store: &dyn Store, book_id: &str) -> StoreResult<()> {
    if let Some(mut book) = store.get_book_by_id(book_id)? {
        book.metadata_review_status = Some(MetadataReviewStatus::NoMatch);
        store.update_book(&book)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{AudioFormat, LibraryState};
    use crate::store::SqliteStore;

    fn sample_book(id: &str) -> Book {
        Book {
            id: id.to_string(),
            title: "Original Title".to_string(),
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

    #[test]
    fn updating_the_title_records_one_history_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_book(&sample_book("b1")).unwrap();

        let updates = BookUpdates { title: Some("New Title".to_string()), ..Default::default() };
        let updated = update_audiobook(&store, "b1", &updates, &serde_json::json!({}), 1000).unwrap();

        assert_eq!(updated.title, "New Title");
        let history = store.get_metadata_change_history("b1", 10, 0).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].field, "title");
    }

    #[test]
    fn unchanged_payload_records_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_book(&sample_book("b1")).unwrap();

        let updates = BookUpdates { title: Some("Original Title".to_string()), ..Default::default() };
        update_audiobook(&store, "b1", &updates, &serde_json::json!({}), 1000).unwrap();

        assert!(store.get_metadata_change_history("b1", 10, 0).unwrap().is_empty());
    }

    #[test]
    fn author_update_splits_joined_names_into_junction_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_book(&sample_book("b1")).unwrap();

        let updates = BookUpdates { author: Some("Alice Smith & Bob Jones".to_string()), ..Default::default() };
        update_audiobook(&store, "b1", &updates, &serde_json::json!({}), 1000).unwrap();

        let authors = store.get_book_authors("b1").unwrap();
        assert_eq!(authors.len(), 2);
    }

    #[test]
    fn mark_no_match_sets_review_status() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create_book(&sample_book("b1")).unwrap();
        mark_no_match(&store, "b1").unwrap();

        let book = store.get_book_by_id("b1").unwrap().unwrap();
        assert_eq!(book.metadata_review_status, Some(MetadataReviewStatus::NoMatch));
    }
}
