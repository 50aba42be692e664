//! Operation handler trait and the progress reporter contract — §4.Q.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;

use crate::store::models::{LogLevel, OperationLog};
use crate::store::{Store, StoreResult};

use super::error::OperationError;

const PROGRESS_THROTTLE: Duration = Duration::from_millis(100);

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Clone, Copy, Default)]
struct ProgressSnapshot {
    current: u64,
    total: u64,
}

struct ProgressState {
    last_persisted: Option<Instant>,
    last_known: ProgressSnapshot,
    last_label: Option<String>,
}

/// Passed to every [`OperationHandler::execute`]. Bundles store access,
/// cancellation, and the progress/log reporter contract in one handle.
pub struct OperationContext {
    pub operation_id: String,
    store: Arc<dyn Store>,
    cancellation_token: CancellationToken,
    sequence: AtomicI64,
    progress: Mutex<ProgressState>,
}

impl OperationContext {
    pub fn new(operation_id: String, store: Arc<dyn Store>, cancellation_token: CancellationToken) -> Self {
        Self {
            operation_id,
            store,
            cancellation_token,
            sequence: AtomicI64::new(0),
            progress: Mutex::new(ProgressState { last_persisted: None, last_known: ProgressSnapshot::default(), last_label: None }),
        }
    }

    /// Clamps monotonically and throttles actual persistence to at most
    /// once per 100ms; the last value is always available to
    /// [`OperationContext::flush_progress`] regardless of throttling.
    pub fn update_progress(&self, current: u64, total: u64, label: Option<&str>) -> StoreResult<()> {
        let mut state = self.progress.lock().unwrap_or_else(|e| e.into_inner());
        state.last_known.current = state.last_known.current.max(current);
        state.last_known.total = total;
        if let Some(label) = label {
            state.last_label = Some(label.to_string());
        }

        let now = Instant::now();
        let should_persist = match state.last_persisted {
            Some(t) => now.duration_since(t) >= PROGRESS_THROTTLE,
            None => true,
        };
        if !should_persist {
            return Ok(());
        }
        state.last_persisted = Some(now);
        let (current, total, label) = (state.last_known.current, state.last_known.total, state.last_label.clone());
        drop(state);
        self.store.update_operation_progress(&self.operation_id, current, total, label.as_deref())
    }

    /// Forces a persist of the last known progress, bypassing the
    /// throttle. Called by the dispatcher around terminal transitions.
    pub fn flush_progress(&self) -> StoreResult<()> {
        let state = self.progress.lock().unwrap_or_else(|e| e.into_inner());
        let (current, total, label) = (state.last_known.current, state.last_known.total, state.last_label.clone());
        drop(state);
        self.store.update_operation_progress(&self.operation_id, current, total, label.as_deref())
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>, attributes: JsonValue) -> StoreResult<()> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.store.append_operation_log(&OperationLog {
            operation_id: self.operation_id.clone(),
            sequence,
            timestamp: now(),
            level,
            message: message.into(),
            attributes,
        })
    }

    pub fn is_canceled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Convenience for handlers: turns cancellation into the same error
    /// variant a worker would otherwise have to construct by hand.
    pub fn bail_if_canceled(&self) -> Result<(), OperationError> {
        if self.is_canceled() {
            return Err(OperationError::Canceled);
        }
        Ok(())
    }
}

/// One kind of work the queue knows how to run. Implementations should
/// check `ctx.is_canceled()` between logical units of work and report
/// progress via `ctx.update_progress`.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn execute(&self, ctx: &OperationContext) -> Result<(), OperationError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::store::models::OperationType;
    use crate::store::models::Priority;
    use serde_json::json;
    use std::thread::sleep;

    fn ctx() -> (OperationContext, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let op = store.create_operation(OperationType::Scan, Priority::Normal).unwrap();
        (OperationContext::new(op.id, store.clone(), CancellationToken::new()), store)
    }

    #[test]
    fn progress_clamps_and_persists_first_call() {
        let (ctx, store) = ctx();
        ctx.update_progress(5, 10, Some("scanning")).unwrap();
        let op = store.get_operation(&ctx.operation_id).unwrap().unwrap();
        assert_eq!(op.progress_current, 5);
        assert_eq!(op.progress_total, 10);
        assert_eq!(op.progress_label.as_deref(), Some("scanning"));
    }

    #[test]
    fn progress_is_throttled_within_window() {
        let (ctx, store) = ctx();
        ctx.update_progress(1, 100, None).unwrap();
        ctx.update_progress(50, 100, None).unwrap();
        let op = store.get_operation(&ctx.operation_id).unwrap().unwrap();
        assert_eq!(op.progress_current, 1, "second call landed inside the throttle window");

        sleep(Duration::from_millis(110));
        ctx.update_progress(50, 100, None).unwrap();
        let op = store.get_operation(&ctx.operation_id).unwrap().unwrap();
        assert_eq!(op.progress_current, 50);
    }

    #[test]
    fn flush_progress_writes_last_known_value_even_if_throttled() {
        let (ctx, store) = ctx();
        ctx.update_progress(1, 100, None).unwrap();
        ctx.update_progress(99, 100, Some("done")).unwrap();
        ctx.flush_progress().unwrap();
        let op = store.get_operation(&ctx.operation_id).unwrap().unwrap();
        assert_eq!(op.progress_current, 99);
        assert_eq!(op.progress_label.as_deref(), Some("done"));
    }

    #[test]
    fn log_persists_with_increasing_sequence() {
        let (ctx, store) = ctx();
        ctx.log(LogLevel::Info, "started", json!({})).unwrap();
        ctx.log(LogLevel::Warn, "slow disk", json!({"ms": 500})).unwrap();
        let logs = store.get_operation_logs(&ctx.operation_id).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].sequence, 0);
        assert_eq!(logs[1].sequence, 1);
    }

    #[test]
    fn is_canceled_reflects_token() {
        let token = CancellationToken::new();
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let op = store.create_operation(OperationType::Scan, Priority::Normal).unwrap();
        let ctx = OperationContext::new(op.id, store, token.clone());
        assert!(!ctx.is_canceled());
        token.cancel();
        assert!(ctx.is_canceled());
        assert!(matches!(ctx.bail_if_canceled(), Err(OperationError::Canceled)));
    }
}
