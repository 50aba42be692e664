//! Scan checkpointing — §4.N. Persisted under the generic KV store so a
//! crashed or canceled scan can resume instead of restarting from scratch.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::store::error::StoreResult;
use crate::store::Store;

fn key(operation_id: &str) -> String {
    format!("scan:checkpoint:{operation_id}")
}

const PREFIX: &str = "scan:checkpoint:";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanCheckpoint {
    pub operation_id: String,
    pub root_dir: String,
    pub scanned_dirs: HashSet<String>,
    pub dirs_remaining: Vec<String>,
    pub books_found: u64,
    pub last_updated_at: i64,
}

impl ScanCheckpoint {
    pub fn new(operation_id: impl Into<String>, root_dir: impl Into<String>, dirs_remaining: Vec<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            root_dir: root_dir.into(),
            scanned_dirs: HashSet::new(),
            dirs_remaining,
            books_found: 0,
            last_updated_at: 0,
        }
    }

    pub fn mark_scanned(&mut self, dir: &str, now: i64) {
        self.scanned_dirs.insert(dir.to_string());
        self.dirs_remaining.retain(|d| d != dir);
        self.last_updated_at = now;
    }
}

pub fn save(store: &dyn Store, checkpoint: &ScanCheckpoint) -> StoreResult<()> {
    let bytes = serde_json::to_vec(checkpoint)?;
    store.kv_set(&key(&checkpoint.operation_id), &bytes)
}

pub fn load(store: &dyn Store, operation_id: &str) -> StoreResult<Option<ScanCheckpoint>> {
    match store.kv_get(&key(operation_id))? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

pub fn clear(store: &dyn Store, operation_id: &str) -> StoreResult<()> {
    store.kv_delete(&key(operation_id))
}

/// Checkpoints belonging to operations no longer present in the store at
/// all (GC'd), i.e. resumable state with nothing left to resume into.
pub fn list_orphaned(store: &dyn Store) -> StoreResult<Vec<ScanCheckpoint>> {
    let mut orphaned = Vec::new();
    store.kv_iterate_prefix(PREFIX, &mut |_key, bytes| {
        let checkpoint: ScanCheckpoint = serde_json::from_slice(bytes)?;
        if store.get_operation(&checkpoint.operation_id)?.is_none() {
            orphaned.push(checkpoint);
        }
        Ok(())
    })?;
    Ok(orphaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{OperationType, Priority};
    use crate::store::SqliteStore;

    #[test]
    fn save_and_load_round_trips() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut checkpoint = ScanCheckpoint::new("op-1", "/library", vec!["a".into(), "b".into()]);
        checkpoint.mark_scanned("a", 100);
        checkpoint.books_found = 3;
        save(&store, &checkpoint).unwrap();

        let loaded = load(&store, "op-1").unwrap().unwrap();
        assert_eq!(loaded.dirs_remaining, vec!["b".to_string()]);
        assert_eq!(loaded.books_found, 3);
        assert!(loaded.scanned_dirs.contains("a"));
    }

    #[test]
    fn missing_checkpoint_loads_as_none() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(load(&store, "nope").unwrap().is_none());
    }

    #[test]
    fn clear_removes_the_checkpoint() {
        let store = SqliteStore::open_in_memory().unwrap();
        let checkpoint = ScanCheckpoint::new("op-1", "/library", vec![]);
        save(&store, &checkpoint).unwrap();
        clear(&store, "op-1").unwrap();
        assert!(load(&store, "op-1").unwrap().is_none());
    }

    #[test]
    fn orphaned_checkpoints_are_those_whose_operation_is_gone() {
        let store = SqliteStore::open_in_memory().unwrap();
        let op = store.create_operation(OperationType::Scan, Priority::Normal).unwrap();
        save(&store, &ScanCheckpoint::new(op.id.clone(), "/library", vec![])).unwrap();
        save(&store, &ScanCheckpoint::new("gone", "/library", vec![])).unwrap();

        let orphaned = list_orphaned(&store).unwrap();
        assert_eq!(orphaned.len(), 1);
        assert_eq!(orphaned[0].operation_id, "gone");
    }
}
