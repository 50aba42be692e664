use thiserror::Error;

use crate::file_ops::FileOpError;
use crate::store::StoreError;
use crate::template::TemplateError;

#[derive(Debug, Error)]
pub enum OrganiserError {
    #[error("template expansion failed: {0}")]
    Template(#[from] TemplateError),

    #[error("file operation failed: {0}")]
    FileOp(#[from] FileOpError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
