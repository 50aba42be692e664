//! Download-client shadow-seeding subsystem — §4.D. Creates seed-friendly
//! link/copy mirrors of organised files and runs the periodic cleanup
//! state machine with per-torrent config overrides.

pub mod cleanup;
pub mod config_override;
pub mod creation;
pub mod error;
pub mod torrent_client;

pub use cleanup::{run_cleanup_tick, run_ticker, CleanupSummary};
pub use config_override::{put_override, resolve_config, ShadowConfig};
pub use creation::create_shadow_links;
pub use error::ShadowError;
pub use torrent_client::{TorrentClient, TorrentStatus};
