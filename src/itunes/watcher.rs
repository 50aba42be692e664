//! Filesystem-change watcher for the configured iTunes library path —
//! §4.I. Sets a "changed" flag on external `write`/`create`/`rename`
//! events; the flag is cleared by a successful import or write-back.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::warn;

/// Shared, cheaply-cloned flag: 0 means "no external change observed
/// since the last import/write-back", any other value is the unix
/// timestamp of the most recent external change.
#[derive(Clone, Default)]
pub struct ChangeFlag(Arc<AtomicI64>);

impl ChangeFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicI64::new(0)))
    }

    pub fn mark_changed(&self, at: i64) {
        self.0.store(at, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(0, Ordering::SeqCst);
    }

    pub fn last_external_change(&self) -> Option<i64> {
        match self.0.load(Ordering::SeqCst) {
            0 => None,
            t => Some(t),
        }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Attaches a watcher to `library_path`'s parent directory (some editors
/// replace the file via rename rather than writing in place, which only
/// fires on the containing directory) and marks `flag` on relevant events.
/// The returned `RecommendedWatcher` must be kept alive for the duration
/// the watch should remain active.
pub fn attach(library_path: &Path, flag: ChangeFlag) -> notify::Result<RecommendedWatcher> {
    let target: PathBuf = library_path.to_path_buf();
    let watch_dir = library_path.parent().unwrap_or(Path::new(".")).to_path_buf();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            let relevant = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_))
                && event.paths.iter().any(|p| p == &target);
            if relevant {
                flag.mark_changed(now());
            }
        }
        Err(e) => warn!(error = %e, "itunes library watcher error"),
    })?;

    watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_starts_unset_and_clears_back_to_none() {
        let flag = ChangeFlag::new();
        assert_eq!(flag.last_external_change(), None);
        flag.mark_changed(100);
        assert_eq!(flag.last_external_change(), Some(100));
        flag.clear();
        assert_eq!(flag.last_external_change(), None);
    }
}
