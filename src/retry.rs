//! Bounded retry with linearly increasing backoff.
//!
//! Used by the cover-upload step only: the download pipeline itself never
//! retries in-process (the enclosing job queue's at-least-once semantics
//! cover transient failures there).

use std::future::Future;
use std::time::Duration;

/// Execute an operation up to `max_attempts` times
///
/// Attempt N sleeps `base_delay * N` before the next try. Returns the first
/// success, or the last error once the ceiling is reached: the caller
/// decides how exhaustion is surfaced.
pub async fn retry_with_backoff<F, Fut, T, E>(
    max_attempts: u32,
    base_delay: Duration,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if attempt < max_attempts => {
                let delay = base_delay * attempt;
                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    attempts = attempt,
                    "Operation failed after all retry attempts exhausted"
                );
                return Err(e);
            }
        }
    }
}
