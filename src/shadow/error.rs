//! Download-shadow subsystem error taxonomy — §4.D.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShadowError {
    #[error("torrent client unreachable: {0}")]
    ClientUnreachable(String),

    #[error(transparent)]
    FileOp(#[from] crate::file_ops::FileOpError),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
