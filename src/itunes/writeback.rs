//! `WriteBack(options)` with optimistic-concurrency conflict detection —
//! §4.I.

use std::path::{Path, PathBuf};

use crate::store::Store;

use super::error::ITunesError;
use super::fingerprint::{compute_fingerprint, from_stored, matches, to_stored};
use super::plist_model::rewrite_locations;

#[derive(Debug, Clone, Default)]
pub struct WriteBackOptions {
    pub force_overwrite: bool,
    pub new_locations: Vec<(i64, PathBuf)>,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Before any modification: if a stored fingerprint exists for
/// `library_path` and `!options.force_overwrite`, the current on-disk
/// fingerprint must still match it or this returns
/// [`ITunesError::LibraryModified`]. On success, rewrites the plist and
/// persists the new fingerprint.
pub fn write_back(store: &dyn Store, library_path: &Path, options: &WriteBackOptions) -> Result<(), ITunesError> {
    let path_str = library_path.to_string_lossy().to_string();
    let stored = store.get_itunes_fingerprint(&path_str)?;

    if let Some(stored) = &stored {
        if !options.force_overwrite {
            let current = compute_fingerprint(library_path)?;
            let stored_fp = from_stored(stored);
            if !matches(&stored_fp, &current) {
                return Err(ITunesError::LibraryModified { stored: stored_fp, current });
            }
        }
    }

    rewrite_locations(library_path, &options.new_locations)?;

    let new_fp = compute_fingerprint(library_path)?;
    store.put_itunes_fingerprint(&to_stored(&path_str, new_fp, now()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_library(path: &Path) {
        let mut file = std::fs::File::create(path).unwrap();
        write!(
            file,
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Tracks</key>
    <dict>
        <key>1</key>
        <dict>
            <key>Name</key><string>Project Hail Mary</string>
            <key>Location</key><string>file://localhost/old/path.m4b</string>
        </dict>
    </dict>
</dict>
</plist>"#
        )
        .unwrap();
    }

    #[test]
    fn first_write_back_has_nothing_to_conflict_with() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Library.xml");
        write_library(&path);

        let store = SqliteStore::open_in_memory().unwrap();
        let options = WriteBackOptions { force_overwrite: false, new_locations: vec![(1, PathBuf::from("/new/path.m4b"))] };
        write_back(&store, &path, &options).unwrap();

        assert!(store.get_itunes_fingerprint(&path.to_string_lossy()).unwrap().is_some());
    }

    #[test]
    fn external_modification_without_force_is_a_conflict() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Library.xml");
        write_library(&path);

        let store = SqliteStore::open_in_memory().unwrap();
        write_back(&store, &path, &WriteBackOptions::default()).unwrap();

        // external modification
        std::fs::write(&path, b"<plist>something entirely different and longer</plist>").unwrap();

        let result = write_back(&store, &path, &WriteBackOptions::default());
        assert!(matches!(result, Err(ITunesError::LibraryModified { .. })));
    }

    #[test]
    fn force_overwrite_bypasses_the_conflict_check() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Library.xml");
        write_library(&path);

        let store = SqliteStore::open_in_memory().unwrap();
        write_back(&store, &path, &WriteBackOptions::default()).unwrap();
        write_library(&path);

        let options = WriteBackOptions { force_overwrite: true, new_locations: vec![] };
        write_back(&store, &path, &options).unwrap();
    }
}
