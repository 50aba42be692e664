//! Store-level error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("not supported by this backend: {0}")]
    NotSupported(&'static str),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;
