//! `CreateShadowLinks` — §4.D. Re-creates a torrent's file layout under
//! `shadow_base/torrent_name/` via the organiser's link-or-copy fallback
//! chain, then persists the `ShadowRecord`.

use std::path::{Path, PathBuf};

use crate::file_ops::{link_or_copy, LinkStrategy};
use crate::store::models::{ShadowRecord, ShadowStatus};
use crate::store::Store;

use super::error::ShadowError;
use super::torrent_client::TorrentClient;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// `files` are paths relative to `download_dir`.
pub async fn create_shadow_links(
    store: &dyn Store,
    client: &dyn TorrentClient,
    download_dir: &Path,
    shadow_base: &Path,
    torrent_id: &str,
    torrent_name: &str,
    files: &[PathBuf],
    total_uploaded: u64,
) -> Result<(), ShadowError> {
    let shadow_dir = shadow_base.join(torrent_name);

    for relative in files {
        let src = download_dir.join(relative);
        let dst = shadow_dir.join(relative);
        link_or_copy(&src, &dst, LinkStrategy::Auto)?;
    }

    client.set_download_path(torrent_id, &shadow_dir).await?;

    let record = ShadowRecord {
        torrent_id: torrent_id.to_string(),
        torrent_name: torrent_name.to_string(),
        shadow_dir: shadow_dir.to_string_lossy().to_string(),
        created_at: now(),
        last_activity_at: now(),
        last_upload_bytes: total_uploaded,
        pause_started_at: None,
        status: ShadowStatus::Active,
    };
    store.put_shadow_record(&record)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FakeClient;

    #[async_trait]
    impl TorrentClient for FakeClient {
        async fn status(&self, _id: &str) -> Result<Option<super::super::torrent_client::TorrentStatus>, ShadowError> {
            Ok(None)
        }

        async fn set_download_path(&self, _id: &str, _path: &Path) -> Result<(), ShadowError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn creates_links_preserving_relative_layout_and_persists_a_record() {
        let download_dir = TempDir::new().unwrap();
        let shadow_base = TempDir::new().unwrap();
        std::fs::create_dir_all(download_dir.path().join("disc1")).unwrap();
        std::fs::write(download_dir.path().join("disc1/book.mp3"), b"audio").unwrap();

        let store = SqliteStore::open_in_memory().unwrap();
        let client = FakeClient;

        create_shadow_links(
            &store,
            &client,
            download_dir.path(),
            shadow_base.path(),
            "torrent-1",
            "My Book",
            &[PathBuf::from("disc1/book.mp3")],
            1000,
        )
        .await
        .unwrap();

        let shadow_path = shadow_base.path().join("My Book/disc1/book.mp3");
        assert!(shadow_path.exists());
        assert_eq!(std::fs::read(&shadow_path).unwrap(), b"audio");

        let record = store.get_shadow_record("torrent-1").unwrap().unwrap();
        assert_eq!(record.status, ShadowStatus::Active);
        assert_eq!(record.last_upload_bytes, 1000);
    }
}
