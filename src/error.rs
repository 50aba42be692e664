//! Core error taxonomy.
//!
//! Kinds mirror the taxonomy in the spec (not-found, validation, conflict,
//! transient-external, permanent-external, integrity, corrupted-path,
//! fatal-startup). Leaf errors are `thiserror` enums; the service façade
//! and `main.rs` compose them with `anyhow`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("corrupted path: unresolved placeholder(s) in {0:?}")]
    CorruptedPath(PathBuf),

    #[error("fatal startup error: {0}")]
    FatalStartup(String),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Whether an error represents a transient condition worth retrying
/// (network timeout, rate limit, 5xx-with-retry-after) versus a
/// permanent one that should fall through to the next cascade step.
pub trait Transience {
    fn is_transient(&self) -> bool;
}
