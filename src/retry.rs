//! Transient-failure classification and exponential backoff.
//!
//! Mirrors `original_source`'s `retry_transient` decorator: classify the
//! failure, and if transient, retry up to `max_attempts` times with
//! exponentially growing backoff clamped to `max_backoff`.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::AppError;

/// Retry policy, loaded from `RETRY_MAX_ATTEMPTS` / `RETRY_MIN_BACKOFF_SECONDS`
/// / `RETRY_MAX_BACKOFF_SECONDS` (see `config.rs`).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    fn backoff_for(&self, attempt: u32) -> Duration {
        let scale = 2u32.saturating_pow(attempt.saturating_sub(1));
        let backoff = self.min_backoff.saturating_mul(scale);
        backoff.min(self.max_backoff)
    }
}

/// Whether an error represents a transient condition worth retrying:
/// upstream failures, rate limiting, and generic internal errors (which
/// in this crate stand in for connection/timeout failures at the HTTP
/// boundary). Client errors (4xx other than 429) are never transient.
pub fn is_transient(err: &AppError) -> bool {
    err.is_retryable()
}

/// Run `f`, retrying while `is_transient` returns true for the error,
/// sleeping with exponential backoff between attempts. Returns the last
/// error once `max_attempts` is exhausted.
pub async fn retry_transient<F, Fut, T>(policy: RetryPolicy, mut f: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && is_transient(&err) => {
                let delay = policy.backoff_for(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
