//! Backoff for idempotent ledger reads.
//!
//! Commits are never retried: a timed-out commit may still land, and a second
//! submission would be rejected as a duplicate at best.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Backoff schedule for read retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub initial_delay: Duration,

    /// Upper bound on any single delay.
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each failure.
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Default schedule with `retries` extra attempts.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            ..Self::default()
        }
    }

    /// Single attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            exponential_base: 1.0,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.exponential_base).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempts run out.
///
/// # Example
///
/// ```rust,no_run
/// use rbac_ledger::retry::{retry_if, RetryPolicy};
/// use rbac_ledger::LedgerError;
///
/// async fn example() -> Result<u32, LedgerError> {
///     retry_if(
///         &RetryPolicy::default(),
///         "get_block",
///         || async { Ok(7) },
///         LedgerError::is_retryable,
///     )
///     .await
/// }
/// ```
pub async fn retry_if<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    let mut delay = policy.initial_delay;

    loop {
        attempt += 1;

        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation, attempts = attempt, "Ledger read succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) if attempt >= policy.max_attempts => {
                tracing::error!(operation, attempts = attempt, error = ?e, "Ledger read failed, giving up");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = ?e,
                    "Ledger read failed, retrying"
                );
                sleep(delay).await;
                delay = policy.next_delay(delay);
            }
        }
    }
}
