//! Bounded retry with exponential backoff.
//!
//! Every failure (transport error or non-success status) is treated as
//! retryable until the attempt cap is reached.

use std::future::Future;

use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::FetchError;
use crate::metrics;

/// Runs `op` until it succeeds or `policy.max_attempts` attempts have failed.
///
/// `op` receives the 1-based attempt number. After failed attempt `n` the
/// loop sleeps `policy.delay_after(n)` before trying again; no sleep follows
/// the final attempt.
///
/// # Errors
///
/// Returns `FetchError::FetchExhausted` naming `target` and the attempt count.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    target: &str,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        debug!(url = %target, attempt = attempt, "Fetch attempt");

        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if attempt >= max_attempts {
            warn!(
                url = %target,
                attempts = attempt,
                error = %err,
                "Fetch failed, giving up"
            );
            return Err(FetchError::exhausted(target, attempt, &err));
        }

        let delay = policy.delay_after(attempt);
        warn!(
            url = %target,
            attempt = attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Fetch failed, retrying"
        );
        metrics::record_fetch_retry();
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
