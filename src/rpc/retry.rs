//! Retry policy for transient chunk failures
//!
//! Delay before retry `n` (1-based count of failed attempts) is
//! `initial_backoff * multiplier^(n-1)`, capped at `max_backoff`, then
//! scaled by a uniform factor in `[1 - jitter, 1 + jitter]`.

use crate::core::error::RequestError;
use crate::rpc::message::StatusCode;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff with jitter, bounded by attempts and elapsed time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per chunk, including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
    /// Relative jitter in `[0, 1]`
    pub jitter: f64,
    /// Budget measured from the chunk's first dispatch
    pub max_elapsed_ms: u64,
    /// Statuses worth retrying
    pub retryable: Vec<StatusCode>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 250,
            max_backoff_ms: 16_000,
            multiplier: 2.0,
            jitter: 0.2,
            max_elapsed_ms: 300_000,
            retryable: vec![
                StatusCode::ResourceExhausted,
                StatusCode::Unavailable,
                StatusCode::DeadlineExceeded,
                StatusCode::Aborted,
            ],
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn is_retryable(&self, code: StatusCode) -> bool {
        self.retryable.contains(&code)
    }

    pub fn max_elapsed(&self) -> Duration {
        Duration::from_millis(self.max_elapsed_ms)
    }

    /// Delay before the next attempt, without jitter
    pub fn base_delay(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1) as i32;
        let millis = self.initial_backoff_ms as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(millis.min(self.max_backoff_ms as f64) as u64)
    }

    /// Delay before the next attempt, with jitter drawn from `rng`
    pub fn backoff_delay<R: Rng>(&self, failed_attempts: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(failed_attempts);
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = rng.gen_range(1.0 - self.jitter..=1.0 + self.jitter);
        base.mul_f64(factor.max(0.0))
    }

    /// Whether another attempt fits in the budget
    pub fn allows_retry(&self, failed_attempts: u32, elapsed: Duration, delay: Duration) -> bool {
        failed_attempts < self.max_attempts && elapsed + delay <= self.max_elapsed()
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.max_attempts == 0 {
            return Err(RequestError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(self.multiplier >= 1.0) {
            return Err(RequestError::InvalidConfig(format!(
                "retry.multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(RequestError::InvalidConfig(format!(
                "retry.jitter must be within [0, 1], got {}",
                self.jitter
            )));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(RequestError::InvalidConfig(
                "retry.initial_backoff_ms exceeds retry.max_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_base_delay_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay(1), Duration::from_millis(250));
        assert_eq!(policy.base_delay(2), Duration::from_millis(500));
        assert_eq!(policy.base_delay(4), Duration::from_millis(2000));
        assert_eq!(policy.base_delay(30), Duration::from_millis(16_000));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 1..8 {
            let base = policy.base_delay(attempt).as_secs_f64();
            let delay = policy.backoff_delay(attempt, &mut rng).as_secs_f64();
            assert!(delay >= base * 0.8 - 1e-9 && delay <= base * 1.2 + 1e-9);
        }
    }

    #[test]
    fn test_budget() {
        let policy = RetryPolicy::default();
        let second = Duration::from_secs(1);
        assert!(policy.allows_retry(1, second, second));
        assert!(!policy.allows_retry(5, second, second));
        assert!(!policy.allows_retry(1, Duration::from_secs(300), second));
        assert!(!RetryPolicy::no_retry().allows_retry(1, Duration::ZERO, Duration::ZERO));
    }

    #[test]
    fn test_retryable_statuses() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable(StatusCode::ResourceExhausted));
        assert!(policy.is_retryable(StatusCode::Aborted));
        assert!(!policy.is_retryable(StatusCode::InvalidArgument));
        assert!(!policy.is_retryable(StatusCode::Unauthenticated));
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate().is_ok());
        let bad = RetryPolicy {
            jitter: 1.5,
            ..RetryPolicy::default()
        };
        assert!(bad.validate().is_err());
        let bad = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 3}"#).unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff_ms, 250);
        assert_eq!(policy.retryable.len(), 4);
    }
}
