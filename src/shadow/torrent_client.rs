//! Download-client contract — §4.D. The concrete client (qBittorrent,
//! Transmission, Deluge, ...) lives outside this repo; only the contract
//! matters here.

use std::path::Path;

use async_trait::async_trait;

use super::error::ShadowError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TorrentStatus {
    pub paused: bool,
    pub total_uploaded: u64,
    pub total_size: u64,
}

#[async_trait]
pub trait TorrentClient: Send + Sync {
    /// `Ok(None)` means the torrent no longer exists on the client
    /// (removed by the user). An unreachable client is an `Err` — the
    /// cleanup tick does nothing that cycle rather than treating it as
    /// removed.
    async fn status(&self, torrent_id: &str) -> Result<Option<TorrentStatus>, ShadowError>;

    async fn set_download_path(&self, torrent_id: &str, path: &Path) -> Result<(), ShadowError>;
}
