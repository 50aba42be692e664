//! iTunes library integration — §4.I. Plist parsing, external-change
//! fingerprinting, conflict-checked write-back, and a filesystem watcher.

pub mod error;
pub mod fingerprint;
pub mod import;
pub mod plist_model;
pub mod validate;
pub mod watcher;
pub mod writeback;

pub use error::ITunesError;
pub use fingerprint::{compute_fingerprint, LibraryFingerprint};
pub use import::{ITunesImportHandler, ImportOptions};
pub use validate::{validate, ValidationReport};
pub use watcher::ChangeFlag;
pub use writeback::{write_back, WriteBackOptions};

use crate::store::Store;

#[derive(Debug, Clone, PartialEq)]
pub struct LibraryStatus {
    pub configured: bool,
    pub fingerprint_stored: bool,
    pub changed_since_import: bool,
    pub last_imported: Option<i64>,
    pub last_external_change: Option<i64>,
}

/// `GetITunesLibraryStatus(path)` — §4.A.
pub fn library_status(
    store: &dyn Store,
    library_path: Option<&str>,
    change_flag: Option<&ChangeFlag>,
) -> Result<LibraryStatus, crate::store::StoreError> {
    let Some(path) = library_path else {
        return Ok(LibraryStatus {
            configured: false,
            fingerprint_stored: false,
            changed_since_import: false,
            last_imported: None,
            last_external_change: None,
        });
    };

    let stored = store.get_itunes_fingerprint(path)?;
    let last_external_change = change_flag.and_then(|f| f.last_external_change());

    Ok(LibraryStatus {
        configured: true,
        fingerprint_stored: stored.is_some(),
        changed_since_import: last_external_change.is_some(),
        last_imported: stored.map(|s| s.updated_at),
        last_external_change,
    })
}
