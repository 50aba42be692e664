//! Exponential backoff for transient operation errors — §4.Q retry policy.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub factor: u32,
    pub cap: Duration,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base: Duration::from_millis(500), factor: 2, cap: Duration::from_secs(30), jitter: 0.10 }
    }
}

impl RetryPolicy {
    /// Delay before retry attempt `attempt` (1-indexed: the delay before
    /// the *second* try is `backoff_for(1)`). Jitter is applied as a
    /// uniform +/- `jitter` fraction of the capped exponential delay.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = self.factor.saturating_pow(attempt.saturating_sub(1));
        let uncapped = self.base.saturating_mul(exp);
        let capped = uncapped.min(self.cap);

        let jitter_frac = rand::rng().random_range(-self.jitter..=self.jitter);
        let millis = capped.as_millis() as f64 * (1.0 + jitter_frac);
        Duration::from_millis(millis.max(0.0) as u64)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_and_respects_cap() {
        let policy = RetryPolicy { jitter: 0.0, ..Default::default() };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(2000));

        let policy = RetryPolicy { jitter: 0.0, max_attempts: 20, ..Default::default() };
        assert_eq!(policy.backoff_for(20), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy { jitter: 0.10, ..Default::default() };
        for _ in 0..50 {
            let d = policy.backoff_for(2);
            assert!(d >= Duration::from_millis(900) && d <= Duration::from_millis(1100), "{d:?} out of bounds");
        }
    }

    #[test]
    fn should_retry_stops_at_max_attempts() {
        let policy = RetryPolicy { max_attempts: 3, ..Default::default() };
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }
}
