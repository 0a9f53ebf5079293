//! Bounded retry with exponential backoff.
//!
//! All waiting goes through `tokio::time`, so callers and tests can drive the
//! clock with `tokio::time::pause()` instead of sleeping for real.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// How often and how long to retry a failing operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each failure.
    pub factor: u32,
}

impl RetryPolicy {
    /// Exponential backoff doubling from `initial_delay` up to `max_delay`.
    pub fn exponential(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            initial_delay,
            max_delay,
            factor: 2,
        }
    }

    /// Constant delay between attempts.
    pub fn fixed(interval: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            max_attempts,
            initial_delay: interval,
            max_delay: interval,
            factor: 1,
        }
    }

    /// Delay to wait after the failure with zero-based index `failure`.
    pub fn delay_for(&self, failure: u32) -> Duration {
        let multiplier = self.factor.saturating_pow(failure);
        self.initial_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempts_made` attempts.
    pub fn allows_attempt(&self, attempts_made: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts_made < max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_millis(100), Duration::from_secs(5))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the policy
/// runs out of attempts. The closure receives the zero-based attempt number.
///
/// Returns the last error when giving up.
pub async fn retry<T, E, F, Fut, R>(policy: &RetryPolicy, mut op: F, is_retryable: R) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: Display,
{
    let mut attempts = 0u32;

    loop {
        match op(attempts).await {
            Ok(value) => {
                if attempts > 0 {
                    debug!(attempt = attempts + 1, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                attempts += 1;

                if !is_retryable(&e) {
                    debug!(error = %e, "Non-retryable error encountered");
                    return Err(e);
                }

                if !policy.allows_attempt(attempts) {
                    return Err(e);
                }

                let delay = policy.delay_for(attempts - 1);
                warn!(
                    attempt = attempts,
                    max_attempts = ?policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
