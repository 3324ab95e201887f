//! Metrics for request latency and cache behavior.

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};

// === Metric Name Constants ===

/// HTTP request latency metric name.
pub const METRIC_HTTP_REQUEST_LATENCY: &str = "odds_http_request_latency_ms";
/// Fresh cache hit counter metric name.
pub const METRIC_CACHE_HITS: &str = "odds_cache_hits_total";
/// Cache miss counter metric name.
pub const METRIC_CACHE_MISSES: &str = "odds_cache_misses_total";
/// Stale-served counter metric name.
pub const METRIC_CACHE_STALE_SERVED: &str = "odds_cache_stale_served_total";
/// Query retry counter metric name.
pub const METRIC_QUERY_RETRIES: &str = "odds_query_retries_total";
/// Terminal query failure counter metric name.
pub const METRIC_QUERY_FAILURES: &str = "odds_query_failures_total";
/// Poll tick counter metric name.
pub const METRIC_POLL_TICKS: &str = "odds_poll_ticks_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_HTTP_REQUEST_LATENCY,
        "Provider HTTP request latency in milliseconds"
    );

    describe_counter!(METRIC_CACHE_HITS, "Query reads served from fresh cache");
    describe_counter!(METRIC_CACHE_MISSES, "Query reads with no cached value");
    describe_counter!(
        METRIC_CACHE_STALE_SERVED,
        "Query reads served stale while revalidating"
    );
    describe_counter!(METRIC_QUERY_RETRIES, "Fetch attempts retried after a transient error");
    describe_counter!(METRIC_QUERY_FAILURES, "Queries that exhausted their retries");
    describe_counter!(METRIC_POLL_TICKS, "Poll timer ticks across all live queries");
}

/// Record HTTP request latency for an endpoint.
pub fn record_http_latency(start: Instant, endpoint: &str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_HTTP_REQUEST_LATENCY, "endpoint" => endpoint.to_string()).record(latency_ms);
}

/// Increment the fresh cache hit counter.
pub fn inc_cache_hits(key: &str) {
    counter!(METRIC_CACHE_HITS, "key" => key.to_string()).increment(1);
}

/// Increment the cache miss counter.
pub fn inc_cache_misses(key: &str) {
    counter!(METRIC_CACHE_MISSES, "key" => key.to_string()).increment(1);
}

/// Increment the stale-served counter.
pub fn inc_cache_stale_served(key: &str) {
    counter!(METRIC_CACHE_STALE_SERVED, "key" => key.to_string()).increment(1);
}

/// Increment the query retry counter.
pub fn inc_query_retries(key: &str) {
    counter!(METRIC_QUERY_RETRIES, "key" => key.to_string()).increment(1);
}

/// Increment the terminal failure counter.
pub fn inc_query_failures(key: &str) {
    counter!(METRIC_QUERY_FAILURES, "key" => key.to_string()).increment(1);
}

/// Increment the poll tick counter.
pub fn inc_poll_ticks(key: &str) {
    counter!(METRIC_POLL_TICKS, "key" => key.to_string()).increment(1);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.metric_name).record(latency_ms);
    }
}
