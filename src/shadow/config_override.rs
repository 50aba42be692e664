//! `resolveConfig(torrent_id)` — §4.D. Overlays a per-torrent override
//! (read from `shadow:override:<torrent_id>`) on top of the global
//! shadow config; only non-null override fields take effect.

use crate::config::DownloadClientSettings;
use crate::store::models::TorrentOverride;
use crate::store::Store;

fn override_key(torrent_id: &str) -> String {
    format!("shadow:override:{torrent_id}")
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowConfig {
    pub max_lifetime_enabled: bool,
    pub max_lifetime_days: u32,
    pub pause_timeout_days: u32,
    pub inactivity_window_days: u32,
    pub upload_activity_threshold_pct: f64,
}

impl From<&DownloadClientSettings> for ShadowConfig {
    /// `DownloadClientSettings` has no explicit "is max-lifetime enabled"
    /// flag; a configured positive `max_lifetime_days` is treated as
    /// enabled, matching the only way an operator can express the
    /// threshold through the current CLI/file config surface.
    fn from(settings: &DownloadClientSettings) -> Self {
        Self {
            max_lifetime_enabled: settings.max_lifetime_days > 0,
            max_lifetime_days: settings.max_lifetime_days,
            pause_timeout_days: settings.pause_timeout_days,
            inactivity_window_days: settings.inactivity_window_days,
            upload_activity_threshold_pct: settings.upload_activity_threshold_pct,
        }
    }
}

pub fn put_override(store: &dyn Store, torrent_id: &str, override_: &TorrentOverride) -> crate::store::StoreResult<()> {
    let bytes = serde_json::to_vec(override_)?;
    store.kv_set(&override_key(torrent_id), &bytes)
}

pub fn resolve_config(store: &dyn Store, global: &ShadowConfig, torrent_id: &str) -> crate::store::StoreResult<ShadowConfig> {
    let Some(bytes) = store.kv_get(&override_key(torrent_id))? else {
        return Ok(*global);
    };
    let override_: TorrentOverride = serde_json::from_slice(&bytes)?;

    Ok(ShadowConfig {
        max_lifetime_enabled: override_.max_lifetime_enabled.unwrap_or(global.max_lifetime_enabled),
        max_lifetime_days: override_.max_lifetime_days.unwrap_or(global.max_lifetime_days),
        pause_timeout_days: override_.pause_timeout_days.unwrap_or(global.pause_timeout_days),
        inactivity_window_days: override_.inactivity_window_days.unwrap_or(global.inactivity_window_days),
        upload_activity_threshold_pct: override_.upload_activity_threshold_pct.unwrap_or(global.upload_activity_threshold_pct),
    })
}
