//! Operation execution error taxonomy — §4.Q retry policy.

use thiserror::Error;

use crate::error::Transience;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("transient: {0}")]
    Transient(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("canceled")]
    Canceled,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Transience for OperationError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
