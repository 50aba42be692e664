//! Organiser — §4.O. Moves a Book into the library layout described by a
//! folder pattern and a file pattern.

pub mod error;
pub mod handler;
pub mod journal;
pub mod registry;
pub mod values;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::OrganizationStrategy;
use crate::file_ops::{self, LinkMethod, LinkStrategy};
use crate::store::models::{Book, LibraryState};
use crate::store::Store;
use crate::template;

pub use error::OrganiserError;
pub use handler::OrganiseHandler;
pub use journal::{Journal, JournalEntry};
pub use registry::FolderMutexRegistry;

#[derive(Debug)]
pub enum OrganiseOutcome {
    Organized { book: Book, method: LinkMethod },
    /// Target path equals the source path; nothing was moved, no journal
    /// entry was recorded (§8.3).
    NoOp { book: Book },
    /// Template expansion failed; the book is left untouched and flagged.
    NeedsReview { book_id: String, reason: String },
}

fn to_link_strategy(strategy: OrganizationStrategy) -> LinkStrategy {
    match strategy {
        OrganizationStrategy::Auto => LinkStrategy::Auto,
        OrganizationStrategy::Reflink => LinkStrategy::Reflink,
        OrganizationStrategy::Hardlink => LinkStrategy::Hardlink,
        OrganizationStrategy::Copy => LinkStrategy::Copy,
        // Symlinks aren't a file_ops::LinkStrategy method; callers that pick
        // Symlink get a plain copy plus the original path preserved via the
        // journal, same fallback posture as an unsupported reflink.
        OrganizationStrategy::Symlink => LinkStrategy::Copy,
    }
}

fn build_target_path(
    root_dir: &Path,
    book: &Book,
    folder_pattern: &str,
    file_pattern: &str,
    values: &std::collections::HashMap<String, String>,
) -> Result<PathBuf, OrganiserError> {
    let folder_path = template::expand(folder_pattern, values)?;
    let file_stem = template::expand(file_pattern, values)?;
    let ext = book.format.extension();
    let base = if folder_path.is_empty() { root_dir.to_path_buf() } else { root_dir.join(folder_path) };
    Ok(base.join(format!("{file_stem}.{ext}")))
}

/// Organises a single book. Returns `Ok` for every outcome including
/// `NeedsReview`; only I/O and store errors are propagated as `Err`.
pub async fn organise_book(
    store: Arc<dyn Store>,
    book: Book,
    root_dir: PathBuf,
    folder_pattern: String,
    file_pattern: String,
    strategy: OrganizationStrategy,
    registry: Arc<FolderMutexRegistry>,
    journal: Arc<tokio::sync::Mutex<Journal>>,
) -> Result<OrganiseOutcome, OrganiserError> {
    let values = values::build_value_map(store.as_ref(), &book)?;

    let target_path = match build_target_path(&root_dir, &book, &folder_pattern, &file_pattern, &values) {
        Ok(path) => path,
        Err(OrganiserError::Template(e)) => {
            return Ok(OrganiseOutcome::NeedsReview { book_id: book.id.clone(), reason: e.to_string() });
        }
        Err(e) => return Err(e),
    };

    let src = PathBuf::from(&book.file_path);
    if src == target_path {
        return Ok(OrganiseOutcome::NoOp { book });
    }

    let folder = target_path.parent().unwrap_or(Path::new("/")).to_path_buf();
    let folder_mutex = registry.mutex_for(&folder);
    let _guard = folder_mutex.lock().await;

    let target_path2 = target_path.clone();
    let src2 = src.clone();
    let src_hash = tokio::task::spawn_blocking(move || file_ops::compute_file_hash(&src2))
        .await
        .expect("blocking hash task panicked")?;

    {
        let mut j = journal.lock().await;
        j.record(JournalEntry { src: src.clone(), dst: target_path.clone(), src_hash: src_hash.clone(), method: None });
    }

    let link_strategy = to_link_strategy(strategy);
    let src3 = src.clone();
    let method = tokio::task::spawn_blocking(move || file_ops::link_or_copy(&src3, &target_path2, link_strategy))
        .await
        .expect("blocking link task panicked")?;

    {
        let mut j = journal.lock().await;
        j.mark_method(method);
    }

    let mut updated = book.clone();
    updated.file_path = target_path.to_string_lossy().into_owned();
    updated.file_hash = Some(src_hash);
    updated.library_state = LibraryState::Organized;
    let updated = store.update_book(&updated)?;

    Ok(OrganiseOutcome::Organized { book: updated, method })
}

/// Organises a batch of books with `concurrency` fan-out. On any file
/// operation failure, rolls back everything the batch has done so far and
/// reports the failure alongside the successes that preceded it.
pub async fn organise_batch(
    store: Arc<dyn Store>,
    books: Vec<Book>,
    root_dir: PathBuf,
    folder_pattern: String,
    file_pattern: String,
    strategy: OrganizationStrategy,
    concurrency: usize,
) -> Vec<Result<OrganiseOutcome, OrganiserError>> {
    let registry = Arc::new(FolderMutexRegistry::new());
    let journal = Arc::new(tokio::sync::Mutex::new(Journal::new()));
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    let mut handles = Vec::with_capacity(books.len());
    for book in books {
        let store = store.clone();
        let root_dir = root_dir.clone();
        let folder_pattern = folder_pattern.clone();
        let file_pattern = file_pattern.clone();
        let registry = registry.clone();
        let journal = journal.clone();
        let semaphore = semaphore.clone();

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            organise_book(store, book, root_dir, folder_pattern, file_pattern, strategy, registry, journal).await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    let mut batch_failed = false;
    for handle in handles {
        let result = handle.await.expect("organise task panicked");
        if matches!(result, Err(OrganiserError::FileOp(_))) {
            batch_failed = true;
        }
        results.push(result);
    }

    if batch_failed {
        journal.lock().await.rollback();
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::AudioFormat;
    use crate::store::SqliteStore;
    use tempfile::TempDir;

    fn sample_book(id: &str, file_path: &str) -> Book {
        Book {
            id: id.to_string(),
            title: "Project Hail Mary".to_string(),
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
    async fn organises_a_book_into_the_target_layout() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("incoming").join("book.m4b");
        std::fs::create_dir_all(src.parent().unwrap()).unwrap();
        std::fs::write(&src, b"audio bytes").unwrap();

        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let book = sample_book("b1", src.to_str().unwrap());

        let outcome = organise_book(
            store.clone(),
            book,
            dir.path().join("library"),
            "{title}".to_string(),
            "{title}".to_string(),
            OrganizationStrategy::Copy,
            Arc::new(FolderMutexRegistry::new()),
            Arc::new(tokio::sync::Mutex::new(Journal::new())),
        )
        .await
        .unwrap();

        match outcome {
            OrganiseOutcome::Organized { book, method } => {
                assert_eq!(method, LinkMethod::Copy);
                assert!(Path::new(&book.file_path).exists());
                assert_eq!(book.library_state, LibraryState::Organized);
            }
            other => panic!("expected Organized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_placeholder_flags_needs_review_without_touching_file() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("book.m4b");
        std::fs::write(&src, b"audio bytes").unwrap();

        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let book = sample_book("b1", src.to_str().unwrap());

        let outcome = organise_book(
            store,
            book,
            dir.path().join("library"),
            "{nosuchfield}".to_string(),
            "{title}".to_string(),
            OrganizationStrategy::Copy,
            Arc::new(FolderMutexRegistry::new()),
            Arc::new(tokio::sync::Mutex::new(Journal::new())),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, OrganiseOutcome::NeedsReview { .. }));
        assert!(src.exists());
    }

    #[tokio::test]
    async fn organise_of_identical_target_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("Project Hail Mary.m4b");
        std::fs::write(&target, b"audio bytes").unwrap();

        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let book = sample_book("b1", target.to_str().unwrap());

        let outcome = organise_book(
            store,
            book,
            dir.path().to_path_buf(),
            String::new(),
            "{title}".to_string(),
            OrganizationStrategy::Copy,
            Arc::new(FolderMutexRegistry::new()),
            Arc::new(tokio::sync::Mutex::new(Journal::new())),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, OrganiseOutcome::NoOp { .. }));
    }
}
