//! iTunes subsystem error taxonomy — §4.I.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ITunesError {
    #[error("cannot read library plist at {0:?}: {1}")]
    Unreadable(std::path::PathBuf, std::io::Error),

    #[error("malformed plist: {0}")]
    Malformed(#[from] plist::Error),

    #[error("library modified since last fingerprint: stored {stored:?}, current {current:?}")]
    LibraryModified { stored: super::fingerprint::LibraryFingerprint, current: super::fingerprint::LibraryFingerprint },

    #[error("no fingerprint on record for {0:?}")]
    NoStoredFingerprint(std::path::PathBuf),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),

    #[error(transparent)]
    FileOp(#[from] crate::file_ops::FileOpError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
