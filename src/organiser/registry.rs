//! Per-target-folder mutex registry — §4.O concurrency primitives.
//!
//! Books targeting different folders organise concurrently; books
//! targeting the same folder serialise on that folder's mutex. Mutexes are
//! created lazily on first access under a short-lived registry lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex as AsyncMutex;

#[derive(Default)]
pub struct FolderMutexRegistry {
    mutexes: StdMutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl FolderMutexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mutex_for(&self, folder: &Path) -> Arc<AsyncMutex<()>> {
        let mut mutexes = self.mutexes.lock().unwrap_or_else(|e| e.into_inner());
        mutexes.entry(folder.to_path_buf()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_folder_returns_same_mutex() {
        let registry = FolderMutexRegistry::new();
        let a = registry.mutex_for(Path::new("/library/Andy Weir"));
        let b = registry.mutex_for(Path::new("/library/Andy Weir"));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn different_folders_get_different_mutexes() {
        let registry = FolderMutexRegistry::new();
        let a = registry.mutex_for(Path::new("/library/Andy Weir"));
        let b = registry.mutex_for(Path::new("/library/Brandon Sanderson"));
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn serialises_access_to_the_same_folder() {
        let registry = Arc::new(FolderMutexRegistry::new());
        let mutex = registry.mutex_for(Path::new("/library/shared"));
        let _guard = mutex.lock().await;
        assert!(mutex.try_lock().is_err());
    }
}
