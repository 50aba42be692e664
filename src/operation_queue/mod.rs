//! Priority work queue — §4.Q. A single dispatcher pops the
//! highest-priority ready operation and hands it to a bounded worker
//! pool; workers get a progress/log/cancellation reporter and retry
//! transient failures with backoff.

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod retry;

pub use dispatcher::{OperationQueue, DEFAULT_WORKER_POOL_SIZE};
pub use error::OperationError;
pub use handler::{OperationContext, OperationHandler};
pub use retry::RetryPolicy;
