//! Bounded exponential backoff around the uploader.

use std::future::Future;
use std::time::Duration;

/// Delays shorter than this are pointless against object storage.
const MIN_BACKOFF: Duration = Duration::from_millis(50);
/// Ceiling so a misconfigured multiplier cannot park the worker for minutes.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Backoff schedule: `initial * multiplier^attempt`, clamped to
/// [`MIN_BACKOFF`, `MAX_BACKOFF`].
#[derive(Debug, Clone)]
pub(crate) struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let millis =
            self.initial_backoff.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let millis = millis.min(MAX_BACKOFF.as_millis() as f64);
        Duration::from_millis(millis as u64).clamp(MIN_BACKOFF, MAX_BACKOFF)
    }
}

/// Execute `operation`, retrying every failure with backoff until it succeeds
/// or `max_retries` retries are spent, `max_retries + 1` invocations in
/// total. No error classification: storage-layer failures are treated as
/// transient until the budget runs out, and the terminal error is returned to
/// the caller.
pub(crate) async fn with_retry<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_retries => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::debug!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "upload attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
