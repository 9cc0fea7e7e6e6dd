//! Rate-limit-aware retry wrapper for store operations.
//!
//! Only the throttling class is retried; every other error propagates
//! immediately. Delay doubles per attempt up to a cap.

use relens_db::StoreError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given zero-based attempt:
    /// min(base * 2^attempt, max).
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        // Shift saturates well before u64 overflow territory
        let factor = 1u64 << attempt.min(32);
        let delay_ms = base_ms
            .saturating_mul(factor)
            .min(self.max_delay.as_millis() as u64);
        Duration::from_millis(delay_ms)
    }
}

/// Run a store operation, retrying on throttling per the policy.
///
/// The last throttling error is surfaced once retries are exhausted.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_throttled() && attempt < policy.max_retries => {
                let delay = policy.delay(attempt);
                warn!(
                    "Store throttled (attempt {}), backing off {:?}: {}",
                    attempt, delay, err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
