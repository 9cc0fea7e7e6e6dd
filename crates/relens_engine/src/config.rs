//! Engine configuration.

use crate::retry::RetryPolicy;
use std::time::Duration;

/// Error log entries kept per job before further entries are dropped.
pub const DEFAULT_ERROR_LOG_LIMIT: usize = 100;

/// Pause between successive batches, independent of backoff, to smooth
/// steady-state load on the store.
pub const DEFAULT_INTER_BATCH_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Backoff applied to every store operation on throttling
    pub retry: RetryPolicy,
    /// Fixed delay injected between batches
    pub inter_batch_delay: Duration,
    /// Cap on per-job error log entries
    pub error_log_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            inter_batch_delay: DEFAULT_INTER_BATCH_DELAY,
            error_log_limit: DEFAULT_ERROR_LOG_LIMIT,
        }
    }
}
