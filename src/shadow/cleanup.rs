//! Shadow cleanup state machine — §4.D, ticks every 5 minutes.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::store::models::{ShadowRecord, ShadowStatus};
use crate::store::Store;

use super::config_override::{resolve_config, ShadowConfig};
use super::error::ShadowError;
use super::torrent_client::TorrentClient;

pub const TICK_INTERVAL: Duration = Duration::from_secs(5 * 60);
const SECS_PER_DAY: i64 = 86_400;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupSummary {
    pub marked_pending_removal: usize,
    pub deleted: usize,
    pub skipped_unreachable: usize,
}

/// Runs one cleanup pass over every `ShadowRecord`, active or pending
/// removal. Active records are evaluated against the state machine in
/// order: max-lifetime, client reachability, removal, pause, activity.
/// Records already `pending_removal` have their directory deleted and the
/// record dropped.
pub async fn run_cleanup_tick(store: &dyn Store, client: &dyn TorrentClient, global: &ShadowConfig) -> Result<CleanupSummary, ShadowError> {
    let mut summary = CleanupSummary::default();
    let now = now();

    for record in store.list_shadow_records(Some(ShadowStatus::PendingRemoval))? {
        if let Err(e) = std::fs::remove_dir_all(&record.shadow_dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }
        store.delete_shadow_record(&record.torrent_id)?;
        summary.deleted += 1;
    }

    for record in store.list_shadow_records(Some(ShadowStatus::Active))? {
        let config = resolve_config(store, global, &record.torrent_id)?;
        match evaluate(client, &record, &config, now).await {
            Ok(Some(updated)) => {
                let became_pending = updated.status == ShadowStatus::PendingRemoval;
                store.put_shadow_record(&updated)?;
                if became_pending {
                    summary.marked_pending_removal += 1;
                }
            }
            Ok(None) => {}
            Err(ShadowError::ClientUnreachable(msg)) => {
                warn!(torrent_id = %record.torrent_id, error = %msg, "torrent client unreachable, skipping this cycle");
                summary.skipped_unreachable += 1;
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        marked_pending_removal = summary.marked_pending_removal,
        deleted = summary.deleted,
        skipped_unreachable = summary.skipped_unreachable,
        "shadow cleanup tick complete"
    );
    Ok(summary)
}

/// Returns `Ok(Some(record))` with an updated record when state changed,
/// `Ok(None)` when nothing needs to change, `Err` only for a genuinely
/// unreachable client (fail-safe: do nothing that cycle).
async fn evaluate(client: &dyn TorrentClient, record: &ShadowRecord, config: &ShadowConfig, now: i64) -> Result<Option<ShadowRecord>, ShadowError> {
    let mut record = record.clone();

    if config.max_lifetime_enabled && now > record.created_at + config.max_lifetime_days as i64 * SECS_PER_DAY {
        record.status = ShadowStatus::PendingRemoval;
        return Ok(Some(record));
    }

    let status = client.status(&record.torrent_id).await?;

    let Some(status) = status else {
        record.status = ShadowStatus::PendingRemoval;
        return Ok(Some(record));
    };

    if status.paused {
        let pause_started_at = record.pause_started_at.unwrap_or(now);
        record.pause_started_at = Some(pause_started_at);
        if now > pause_started_at + config.pause_timeout_days as i64 * SECS_PER_DAY {
            record.status = ShadowStatus::PendingRemoval;
        }
        return Ok(Some(record));
    }

    if record.pause_started_at.is_some() {
        record.pause_started_at = None;
    }

    let uploaded_delta = status.total_uploaded.saturating_sub(record.last_upload_bytes);
    let threshold = (config.upload_activity_threshold_pct / 100.0) * status.total_size as f64;
    if (uploaded_delta as f64) >= threshold {
        record.last_activity_at = now;
        record.last_upload_bytes = status.total_uploaded;
    } else if now > record.last_activity_at + config.inactivity_window_days as i64 * SECS_PER_DAY {
        record.status = ShadowStatus::PendingRemoval;
    }

    Ok(Some(record))
}

/// Runs [`run_cleanup_tick`] on a fixed interval until `shutdown` fires.
pub async fn run_ticker(store: Arc<dyn Store>, client: Arc<dyn TorrentClient>, global: ShadowConfig, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = run_cleanup_tick(store.as_ref(), client.as_ref(), &global).await {
                    warn!(error = %e, "shadow cleanup tick failed");
                }
            }
            _ = shutdown.cancelled() => {
                info!("shadow cleanup ticker stopped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct ScriptedClient(Mutex<Vec<Result<Option<super::super::torrent_client::TorrentStatus>, ShadowError>>>);

    #[async_trait]
    impl TorrentClient for ScriptedClient {
        async fn status(&self, _id: &str) -> Result<Option<super::super::torrent_client::TorrentStatus>, ShadowError> {
            let mut queue = self.0.lock().unwrap();
            if queue.is_empty() {
                return Ok(None);
            }
            queue.remove(0)
        }

        async fn set_download_path(&self, _id: &str, _path: &Path) -> Result<(), ShadowError> {
            Ok(())
        }
    }

    fn base_record(created_at: i64) -> ShadowRecord {
        ShadowRecord {
            torrent_id: "t1".to_string(),
            torrent_name: "Book".to_string(),
            shadow_dir: "/tmp/does-not-matter".to_string(),
            created_at,
            last_activity_at: created_at,
            last_upload_bytes: 0,
            pause_started_at: None,
            status: ShadowStatus::Active,
        }
    }

    fn global() -> ShadowConfig {
        ShadowConfig { max_lifetime_enabled: false, max_lifetime_days: 60, pause_timeout_days: 7, inactivity_window_days: 30, upload_activity_threshold_pct: 20.0 }
    }

    #[tokio::test]
    async fn exceeding_max_lifetime_marks_pending_removal() {
        let client = ScriptedClient(Mutex::new(vec![]));
        let record = base_record(now() - 1000 * SECS_PER_DAY);
        let config = ShadowConfig { max_lifetime_enabled: true, ..global() };

        let updated = evaluate(&client, &record, &config, now()).await.unwrap().unwrap();
        assert_eq!(updated.status, ShadowStatus::PendingRemoval);
    }

    #[tokio::test]
    async fn torrent_removed_from_client_marks_pending_removal() {
        let client = ScriptedClient(Mutex::new(vec![Ok(None)]));
        let record = base_record(now());

        let updated = evaluate(&client, &record, &global(), now()).await.unwrap().unwrap();
        assert_eq!(updated.status, ShadowStatus::PendingRemoval);
    }

    #[tokio::test]
    async fn inactivity_beyond_window_marks_pending_removal() {
        let client = ScriptedClient(Mutex::new(vec![Ok(Some(super::super::torrent_client::TorrentStatus {
            paused: false,
            total_uploaded: 0,
            total_size: 1_000_000,
        }))]));
        let record = ShadowRecord { last_activity_at: now() - 31 * SECS_PER_DAY, ..base_record(now() - 31 * SECS_PER_DAY) };

        let updated = evaluate(&client, &record, &global(), now()).await.unwrap().unwrap();
        assert_eq!(updated.status, ShadowStatus::PendingRemoval);
    }

    #[tokio::test]
    async fn activity_above_threshold_resets_the_activity_clock() {
        let client = ScriptedClient(Mutex::new(vec![Ok(Some(super::super::torrent_client::TorrentStatus {
            paused: false,
            total_uploaded: 300_000,
            total_size: 1_000_000,
        }))]));
        let record = ShadowRecord { last_upload_bytes: 0, last_activity_at: now() - 31 * SECS_PER_DAY, ..base_record(now() - 31 * SECS_PER_DAY) };

        let updated = evaluate(&client, &record, &global(), now()).await.unwrap().unwrap();
        assert_eq!(updated.status, ShadowStatus::Active);
        assert_eq!(updated.last_upload_bytes, 300_000);
    }

    #[tokio::test]
    async fn paused_beyond_timeout_marks_pending_removal() {
        let client = ScriptedClient(Mutex::new(vec![Ok(Some(super::super::torrent_client::TorrentStatus {
            paused: true,
            total_uploaded: 0,
            total_size: 1_000_000,
        }))]));
        let record = ShadowRecord { pause_started_at: Some(now() - 8 * SECS_PER_DAY), ..base_record(now() - 8 * SECS_PER_DAY) };

        let updated = evaluate(&client, &record, &global(), now()).await.unwrap().unwrap();
        assert_eq!(updated.status, ShadowStatus::PendingRemoval);
    }

    #[tokio::test]
    async fn full_tick_deletes_directory_for_pending_removal_records() {
        let dir = TempDir::new().unwrap();
        let shadow_dir = dir.path().join("Book");
        std::fs::create_dir_all(&shadow_dir).unwrap();

        let store = SqliteStore::open_in_memory().unwrap();
        let mut record = base_record(now());
        record.status = ShadowStatus::PendingRemoval;
        record.shadow_dir = shadow_dir.to_string_lossy().to_string();
        store.put_shadow_record(&record).unwrap();

        let client = ScriptedClient(Mutex::new(vec![]));
        let summary = run_cleanup_tick(&store, &client, &global()).await.unwrap();

        assert_eq!(summary.deleted, 1);
        assert!(!shadow_dir.exists());
        assert!(store.get_shadow_record("t1").unwrap().is_none());
    }
}
