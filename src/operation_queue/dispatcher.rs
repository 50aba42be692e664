//! Priority dispatcher and worker pool — §4.Q scheduling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::Transience;
use crate::store::models::{Operation, OperationStatus, OperationType, Priority};
use crate::store::{Store, StoreResult};

use super::error::OperationError;
use super::handler::{OperationContext, OperationHandler};
use super::retry::RetryPolicy;

pub const DEFAULT_WORKER_POOL_SIZE: usize = 4;
const AGING_THRESHOLD_SECS: i64 = 300;
const POLL_INTERVAL: Duration = Duration::from_millis(200);

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn bump_priority(priority: Priority) -> Priority {
    match priority {
        Priority::Low => Priority::Normal,
        Priority::Normal => Priority::High,
        Priority::High => Priority::High,
    }
}

/// Single dispatcher loop plus a semaphore-bounded worker pool. One
/// instance owns dispatch for the whole process; `run` is meant to be
/// driven by a single long-lived task started from `main`.
pub struct OperationQueue {
    store: Arc<dyn Store>,
    handlers: HashMap<OperationType, Arc<dyn OperationHandler>>,
    semaphore: Arc<Semaphore>,
    paused: AtomicBool,
    shutdown: CancellationToken,
    retry_policy: RetryPolicy,
    running: Mutex<HashMap<String, CancellationToken>>,
}

impl OperationQueue {
    pub fn new(
        store: Arc<dyn Store>,
        handlers: HashMap<OperationType, Arc<dyn OperationHandler>>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Self::with_worker_pool_size(store, handlers, shutdown, DEFAULT_WORKER_POOL_SIZE)
    }

    pub fn with_worker_pool_size(
        store: Arc<dyn Store>,
        handlers: HashMap<OperationType, Arc<dyn OperationHandler>>,
        shutdown: CancellationToken,
        worker_pool_size: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            handlers,
            semaphore: Arc::new(Semaphore::new(worker_pool_size.max(1))),
            paused: AtomicBool::new(false),
            shutdown,
            retry_policy: RetryPolicy::default(),
            running: Mutex::new(HashMap::new()),
        })
    }

    pub fn enqueue(&self, op_type: OperationType, priority: Priority, depends_on: &[String]) -> StoreResult<Operation> {
        let op = self.store.create_operation(op_type, priority)?;
        if !depends_on.is_empty() {
            self.store.set_operation_depends_on(&op.id, depends_on)?;
        }
        Ok(self.store.get_operation(&op.id)?.unwrap_or(op))
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Cancels a queued or running operation. Queued operations transition
    /// straight to `canceled`; running ones have their token tripped and
    /// transition once the handler observes it.
    pub fn cancel(&self, id: &str) -> StoreResult<()> {
        let token = self.running.lock().unwrap_or_else(|e| e.into_inner()).get(id).cloned();
        if let Some(token) = token {
            token.cancel();
            return Ok(());
        }
        self.store.update_operation_status(id, OperationStatus::Canceled, None)
    }

    /// Drives dispatch until the shutdown token fires. In-flight
    /// operations are allowed to run to completion; pausing only halts
    /// new dispatch.
    pub async fn run(self: Arc<Self>) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            if self.is_paused() {
                tokio::select! {
                    _ = tokio::time::sleep(POLL_INTERVAL) => continue,
                    _ = self.shutdown.cancelled() => break,
                }
            }

            let permit = match self.semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    tokio::select! {
                        _ = tokio::time::sleep(POLL_INTERVAL) => continue,
                        _ = self.shutdown.cancelled() => break,
                    }
                }
            };

            match self.pick_ready_operation() {
                Some(op) => {
                    let this = self.clone();
                    tokio::spawn(async move { this.run_operation(op, Some(permit)).await });
                }
                None => {
                    drop(permit);
                    tokio::select! {
                        _ = tokio::time::sleep(POLL_INTERVAL) => continue,
                        _ = self.shutdown.cancelled() => break,
                    }
                }
            }
        }
    }

    /// Runs at most one ready operation inline, without the permit/spawn
    /// machinery. Used by tests and by callers that want synchronous,
    /// deterministic draining of the queue.
    pub async fn run_once(&self) -> bool {
        match self.pick_ready_operation() {
            Some(op) => {
                self.run_operation(op, None).await;
                true
            }
            None => false,
        }
    }

    fn pick_ready_operation(&self) -> Option<Operation> {
        let mut queued = self.store.list_operations(Some(OperationStatus::Queued)).ok()?;
        self.apply_aging(&mut queued);
        queued.retain(|op| self.is_ready(op));
        queued.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        queued.into_iter().next()
    }

    fn apply_aging(&self, ops: &mut [Operation]) {
        let current = now();
        for op in ops.iter_mut() {
            if op.aging_boosted_at.is_some() {
                continue;
            }
            if current - op.created_at < AGING_THRESHOLD_SECS {
                continue;
            }
            let boosted = bump_priority(op.priority);
            if boosted != op.priority {
                let _ = self.store.set_operation_priority(&op.id, boosted);
                op.priority = boosted;
            }
            let _ = self.store.set_operation_aging_boosted(&op.id, current);
            op.aging_boosted_at = Some(current);
        }
    }

    fn is_ready(&self, op: &Operation) -> bool {
        op.depends_on.iter().all(|dep_id| match self.store.get_operation(dep_id) {
            Ok(Some(dep)) => dep.status.is_terminal(),
            Ok(None) => true,
            Err(_) => false,
        })
    }

    async fn run_operation(&self, op: Operation, _permit: Option<OwnedSemaphorePermit>) {
        let Some(handler) = self.handlers.get(&op.op_type).cloned() else {
            let _ = self.store.update_operation_status(
                &op.id,
                OperationStatus::Failed,
                Some("no handler registered for this operation type"),
            );
            return;
        };

        let token = CancellationToken::new();
        self.running.lock().unwrap_or_else(|e| e.into_inner()).insert(op.id.clone(), token.clone());

        let _ = self.store.update_operation_status(&op.id, OperationStatus::Running, None);
        let ctx = OperationContext::new(op.id.clone(), self.store.clone(), token.clone());

        let mut attempt = 0u32;
        let result = loop {
            attempt += 1;
            if ctx.is_canceled() {
                break Err(OperationError::Canceled);
            }
            let outcome = handler.execute(&ctx).await;
            match &outcome {
                Err(e) if e.is_transient() && self.retry_policy.should_retry(attempt) => {
                    let delay = self.retry_policy.backoff_for(attempt);
                    warn!(operation_id = %ctx.operation_id, attempt, delay_ms = delay.as_millis() as u64, "transient operation error, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = token.cancelled() => break Err(OperationError::Canceled),
                    }
                    continue;
                }
                _ => break outcome,
            }
        };

        let _ = ctx.flush_progress();
        self.running.lock().unwrap_or_else(|e| e.into_inner()).remove(&ctx.operation_id);

        match result {
            Ok(()) => {
                let _ = self.store.update_operation_status(&ctx.operation_id, OperationStatus::Completed, None);
            }
            Err(OperationError::Canceled) => {
                let _ = self.store.update_operation_status(&ctx.operation_id, OperationStatus::Canceled, None);
            }
            Err(e) => {
                let _ = self.store.update_operation_status(&ctx.operation_id, OperationStatus::Failed, Some(&e.to_string()));
            }
        }
    }
}
