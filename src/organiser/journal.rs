//! Rollback journal — §4.O step 5/8. Entries are recorded before the file
//! operation runs so a failed batch can unwind what it already did.

use std::path::PathBuf;

use crate::file_ops::LinkMethod;

#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub src: PathBuf,
    pub dst: PathBuf,
    pub src_hash: String,
    pub method: Option<LinkMethod>,
}

#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    pub fn mark_method(&mut self, method: LinkMethod) {
        if let Some(last) = self.entries.last_mut() {
            last.method = Some(method);
        }
    }

    /// Undoes every recorded entry in reverse order: removes the
    /// destination file (if the operation actually created or linked it)
    /// and removes now-empty parent directories it may have created.
    pub fn rollback(&self) {
        for entry in self.entries.iter().rev() {
            if entry.method.is_some() {
                let _ = std::fs::remove_file(&entry.dst);
            }
            if let Some(parent) = entry.dst.parent() {
                let _ = std::fs::remove_dir(parent);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rollback_removes_completed_entries_in_reverse() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        let dst = nested.join("book.m4b");
        std::fs::write(&dst, b"data").unwrap();

        let mut journal = Journal::new();
        journal.record(JournalEntry {
            src: dir.path().join("src.m4b"),
            dst: dst.clone(),
            src_hash: "deadbeef".to_string(),
            method: Some(LinkMethod::Copy),
        });

        journal.rollback();

        assert!(!dst.exists());
    }

    #[test]
    fn rollback_skips_entries_with_no_recorded_method() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("untouched.m4b");
        std::fs::write(&dst, b"data").unwrap();

        let mut journal = Journal::new();
        journal.record(JournalEntry {
            src: dir.path().join("src.m4b"),
            dst: dst.clone(),
            src_hash: "deadbeef".to_string(),
            method: None,
        });

        journal.rollback();

        assert!(dst.exists());
    }
}
