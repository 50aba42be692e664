//! Stage 1: directory discovery — §4.N.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use walkdir::WalkDir;

use crate::store::models::SUPPORTED_EXTENSIONS;

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn walk(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_supported(p))
        .collect()
}

fn bucket(items: &[PathBuf], n: usize) -> Vec<Vec<PathBuf>> {
    let mut buckets: Vec<Vec<PathBuf>> = (0..n).map(|_| Vec::new()).collect();
    for (i, item) in items.iter().enumerate() {
        buckets[i % n].push(item.clone());
    }
    buckets
}

/// Walks `root` for files with a supported extension. Small trees (fewer
/// top-level children than `concurrent_scans`) are walked sequentially;
/// larger trees partition top-level children into `concurrent_scans`
/// buckets walked concurrently, merged under a mutex.
pub fn discover_files(root: &Path, concurrent_scans: usize) -> std::io::Result<Vec<PathBuf>> {
    let concurrent_scans = concurrent_scans.max(1);
    let top_level: Vec<PathBuf> = std::fs::read_dir(root)?.filter_map(|e| e.ok()).map(|e| e.path()).collect();

    if top_level.len() <= concurrent_scans {
        return Ok(walk(root));
    }

    let buckets = bucket(&top_level, concurrent_scans);
    let results = Mutex::new(Vec::new());
    std::thread::scope(|scope| {
        for bucket in &buckets {
            let results = &results;
            scope.spawn(move || {
                let mut found = Vec::new();
                for entry in bucket {
                    found.extend(walk(entry));
                }
                results.lock().unwrap_or_else(|e| e.into_inner()).extend(found);
            });
        }
    });

    Ok(results.into_inner().unwrap_or_else(|e| e.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"data").unwrap();
    }

    #[test]
    fn finds_supported_files_and_skips_others() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("book.mp3"));
        touch(&dir.path().join("cover.jpg"));
        touch(&dir.path().join("sub/chapter.flac"));

        let found = discover_files(dir.path(), 2).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| is_supported(p)));
    }

    #[test]
    fn bucketed_concurrent_walk_finds_the_same_files_as_sequential() {
        let dir = TempDir::new().unwrap();
        for i in 0..10 {
            touch(&dir.path().join(format!("author{i}/book{i}.m4b")));
        }

        let sequential = discover_files(dir.path(), 1).unwrap();
        let concurrent = discover_files(dir.path(), 4).unwrap();

        let mut seq_sorted = sequential.clone();
        seq_sorted.sort();
        let mut conc_sorted = concurrent.clone();
        conc_sorted.sort();
        assert_eq!(seq_sorted, conc_sorted);
        assert_eq!(seq_sorted.len(), 10);
    }

    #[test]
    fn empty_tree_returns_empty_list() {
        let dir = TempDir::new().unwrap();
        assert!(discover_files(dir.path(), 4).unwrap().is_empty());
    }
}
