//! Per-query cache policy.

use std::time::Duration;

/// Freshness, retry, and polling policy for a single query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPolicy {
    /// Additional fetch attempts after the first failure. Only transient
    /// errors are retried.
    pub retry: u32,
    /// How long a cached value counts as fresh. A stale value is still
    /// served, but triggers a background refetch on access.
    pub stale_time: Duration,
    /// Automatic refetch period, for queries that poll.
    pub poll_interval: Option<Duration>,
}

impl QueryPolicy {
    /// Policy with the given retry count and freshness window, no polling.
    pub fn new(retry: u32, stale_time: Duration) -> Self {
        Self {
            retry,
            stale_time,
            poll_interval: None,
        }
    }

    /// Add a poll interval.
    pub fn with_poll(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }
}

/// Backoff schedule between retry attempts: 500ms doubling per attempt,
/// capped at 5s.
pub(crate) fn retry_delay(attempt: u32) -> Duration {
    const BASE_MS: u64 = 500;
    const MAX_MS: u64 = 5_000;
    let ms = BASE_MS.saturating_mul(1u64 << attempt.min(4));
    Duration::from_millis(ms.min(MAX_MS))
}
