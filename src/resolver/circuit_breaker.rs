//! Per-source circuit breaker — §4.Q. Closed -> Open after 5 consecutive
//! failures; Open rejects fast for a 30s cooldown, then allows one Half-Open
//! probe.

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Mutex;

const FAILURE_THRESHOLD: u32 = 5;
const COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Error)]
#[error("circuit open for this source")]
pub struct CircuitOpenError;

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Tracks consecutive failures for one external metadata source.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self { inner: Mutex::new(Inner { state: BreakerState::Closed, consecutive_failures: 0, opened_at: None }) }
    }
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Ok(())` if a request may proceed (Closed, or Open past
    /// cooldown — which transitions to Half-Open and allows exactly one
    /// probe), or `Err` if the breaker is open.
    pub async fn check(&self) -> Result<(), CircuitOpenError> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::ZERO);
                if elapsed >= COOLDOWN {
                    inner.state = BreakerState::HalfOpen;
                    Ok(())
                } else {
                    Err(CircuitOpenError)
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
            }
            BreakerState::Closed | BreakerState::Open => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= FAILURE_THRESHOLD {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
        }
    }

    pub async fn state(&self) -> BreakerState {
        self.inner.lock().await.state
    }
}
