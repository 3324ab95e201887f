//! String-keyed query cache with stale-while-revalidate reads.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::Stream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::debug;

use crate::error::OddsError;
use crate::metrics;

use super::policy::{retry_delay, QueryPolicy};

/// Fetch operation registered under a cache key.
pub type Fetcher<T> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<T, OddsError>> + Send + Sync>;

type AnyValue = Arc<dyn Any + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&OddsError) + Send + Sync>;

/// Point-in-time view of a query: last data, last error, in-flight flag.
pub struct QuerySnapshot<T> {
    /// Most recent successfully fetched value, possibly stale.
    pub data: Option<Arc<T>>,
    /// Terminal error from the most recent failed fetch. Cleared by the next
    /// successful one; cached data survives it.
    pub error: Option<Arc<OddsError>>,
    /// Whether a fetch for this key is currently in flight.
    pub fetching: bool,
}

impl<T> QuerySnapshot<T> {
    /// True when a value is available (fresh or stale).
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }
}

impl<T> Clone for QuerySnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            fetching: self.fetching,
        }
    }
}

impl<T> Default for QuerySnapshot<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            fetching: false,
        }
    }
}

/// One cached value, type-erased so queries of any entity kind share the map.
#[derive(Clone, Default)]
struct Slot {
    value: Option<AnyValue>,
    error: Option<Arc<OddsError>>,
    updated_at: Option<Instant>,
    fetching: bool,
}

enum Freshness {
    Fresh,
    Stale,
    Absent,
}

/// Shared cache of query results, keyed by cache-key string.
#[derive(Default)]
pub struct QueryCache {
    slots: DashMap<String, Slot>,
}

impl QueryCache {
    /// Create an empty shared cache.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mark a key as outdated so the next access refetches.
    pub fn invalidate(&self, key: &str) {
        if let Some(mut slot) = self.slots.get_mut(key) {
            slot.updated_at = None;
        }
    }

    /// Drop every cached value.
    pub fn clear(&self) {
        self.slots.clear();
    }

    fn snapshot_of<T: Send + Sync + 'static>(&self, key: &str) -> QuerySnapshot<T> {
        let slot = self
            .slots
            .get(key)
            .map(|s| s.value().clone())
            .unwrap_or_default();
        QuerySnapshot {
            data: slot.value.and_then(|v| v.downcast::<T>().ok()),
            error: slot.error,
            fetching: slot.fetching,
        }
    }

    fn freshness(&self, key: &str, stale_time: Duration) -> Freshness {
        match self.slots.get(key) {
            Some(slot) if slot.value.is_some() => match slot.updated_at {
                Some(at) if at.elapsed() < stale_time => Freshness::Fresh,
                _ => Freshness::Stale,
            },
            _ => Freshness::Absent,
        }
    }

    /// Claim the in-flight flag for a key. Returns false when a fetch is
    /// already running, so concurrent reads and poll ticks collapse into one
    /// request.
    fn begin_fetch(&self, key: &str) -> bool {
        let mut slot = self.slots.entry(key.to_string()).or_default();
        if slot.fetching {
            false
        } else {
            slot.fetching = true;
            true
        }
    }

    fn finish_success(&self, key: &str, value: AnyValue) {
        let mut slot = self.slots.entry(key.to_string()).or_default();
        slot.value = Some(value);
        slot.error = None;
        slot.updated_at = Some(Instant::now());
        slot.fetching = false;
    }

    fn finish_failure(&self, key: &str, error: Arc<OddsError>) {
        let mut slot = self.slots.entry(key.to_string()).or_default();
        // Stale data outlives a failed refresh.
        slot.error = Some(error);
        slot.fetching = false;
    }
}

struct QueryInner<T> {
    cache: Arc<QueryCache>,
    key: String,
    policy: QueryPolicy,
    enabled: bool,
    fetcher: Fetcher<T>,
    on_error: Option<ErrorCallback>,
    tx: watch::Sender<QuerySnapshot<T>>,
}

impl<T: Send + Sync + 'static> QueryInner<T> {
    /// Run the fetcher to completion for this key, retrying transient errors
    /// up to the policy's count. No-op when a fetch is already in flight.
    async fn revalidate(&self) {
        if !self.cache.begin_fetch(&self.key) {
            debug!(key = %self.key, "Refetch already in flight, skipping");
            return;
        }
        self.push_state();

        let mut attempt = 0u32;
        loop {
            match (self.fetcher)().await {
                Ok(value) => {
                    let value: AnyValue = Arc::new(value);
                    self.cache.finish_success(&self.key, value);
                    break;
                }
                Err(e) => {
                    if e.is_transient() && attempt < self.policy.retry {
                        metrics::inc_query_retries(&self.key);
                        debug!(key = %self.key, attempt, error = %e, "Retrying after transient error");
                        tokio::time::sleep(retry_delay(attempt)).await;
                        attempt += 1;
                        continue;
                    }

                    metrics::inc_query_failures(&self.key);
                    let error = Arc::new(e);
                    self.cache.finish_failure(&self.key, error.clone());
                    if let Some(on_error) = &self.on_error {
                        on_error(&error);
                    }
                    break;
                }
            }
        }

        self.push_state();
    }

    fn push_state(&self) {
        self.tx.send_replace(self.cache.snapshot_of::<T>(&self.key));
    }
}

/// Handle to a registered query.
///
/// Reads go through [`Query::fetch`]; consumers that want push updates
/// subscribe to the watch channel. Dropping the handle cancels its poll task.
pub struct Query<T> {
    inner: Arc<QueryInner<T>>,
    poller: Option<JoinHandle<()>>,
}

impl<T: Send + Sync + 'static> Query<T> {
    /// Register a fetch operation under a cache key.
    ///
    /// A disabled query never runs its fetcher and never polls; its snapshots
    /// stay empty until a handle is created with `enabled` true.
    pub fn new(
        cache: Arc<QueryCache>,
        key: impl Into<String>,
        policy: QueryPolicy,
        enabled: bool,
        fetcher: Fetcher<T>,
        on_error: Option<ErrorCallback>,
    ) -> Self {
        let key = key.into();
        let (tx, _rx) = watch::channel(QuerySnapshot::default());
        let inner = Arc::new(QueryInner {
            cache,
            key,
            policy,
            enabled,
            fetcher,
            on_error,
            tx,
        });

        let poller = match (enabled, policy.poll_interval) {
            (true, Some(every)) => Some(tokio::spawn(Self::poll_loop(inner.clone(), every))),
            _ => None,
        };

        Self { inner, poller }
    }

    /// Cache key this query is registered under.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Declared policy.
    pub fn policy(&self) -> QueryPolicy {
        self.inner.policy
    }

    /// Whether the query was enabled at registration.
    pub fn enabled(&self) -> bool {
        self.inner.enabled
    }

    /// Current state without triggering any fetch.
    pub fn snapshot(&self) -> QuerySnapshot<T> {
        self.inner.cache.snapshot_of(&self.inner.key)
    }

    /// Subscribe to state changes driven by this handle's fetches and polls.
    pub fn subscribe(&self) -> watch::Receiver<QuerySnapshot<T>> {
        self.inner.tx.subscribe()
    }

    /// Stale-while-revalidate read.
    ///
    /// Disabled: returns the current snapshot, no request. Fresh cached
    /// value: returns it. Stale value: returns it immediately and refetches
    /// in the background. No value: fetches inline.
    pub async fn fetch(&self) -> QuerySnapshot<T> {
        if !self.inner.enabled {
            return self.snapshot();
        }

        match self
            .inner
            .cache
            .freshness(&self.inner.key, self.inner.policy.stale_time)
        {
            Freshness::Fresh => {
                metrics::inc_cache_hits(&self.inner.key);
            }
            Freshness::Stale => {
                metrics::inc_cache_stale_served(&self.inner.key);
                let inner = self.inner.clone();
                tokio::spawn(async move { inner.revalidate().await });
            }
            Freshness::Absent => {
                metrics::inc_cache_misses(&self.inner.key);
                self.inner.revalidate().await;
            }
        }

        self.snapshot()
    }

    async fn poll_loop(inner: Arc<QueryInner<T>>, every: Duration) {
        let mut ticks = interval_at(Instant::now() + every, every);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            metrics::inc_poll_ticks(&inner.key);
            inner.revalidate().await;
        }
    }
}

impl<T> Drop for Query<T> {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
    }
}

/// Adapt a query handle into a stream of snapshots, starting from the
/// current state.
pub fn snapshot_stream<T: Send + Sync + 'static>(
    query: &Query<T>,
) -> impl Stream<Item = QuerySnapshot<T>> {
    let mut rx = query.subscribe();
    async_stream::stream! {
        loop {
            let snap = rx.borrow_and_update().clone();
            yield snap;
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_fetcher(calls: Arc<AtomicU32>) -> Fetcher<u32> {
        Arc::new(move || {
            let calls = calls.clone();
            async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) }.boxed()
        })
    }

    /// Fetcher that fails with the given error until `fail_count` calls have
    /// happened, then returns the call number.
    fn flaky_fetcher(
        calls: Arc<AtomicU32>,
        fail_count: u32,
        error: fn() -> OddsError,
    ) -> Fetcher<u32> {
        Arc::new(move || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= fail_count {
                    Err(error())
                } else {
                    Ok(n)
                }
            }
            .boxed()
        })
    }

    fn connection_error() -> OddsError {
        OddsError::Api(ApiError::Connection("stub".to_string()))
    }

    async fn wait_until<T, F>(query: &Query<T>, mut pred: F) -> QuerySnapshot<T>
    where
        T: Send + Sync + 'static,
        F: FnMut(&QuerySnapshot<T>) -> bool,
    {
        let mut rx = query.subscribe();
        loop {
            let snap = rx.borrow_and_update().clone();
            if pred(&snap) {
                return snap;
            }
            rx.changed().await.expect("query handle dropped");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn absent_value_fetches_inline() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicU32::new(0));
        let query = Query::new(
            cache,
            "k",
            QueryPolicy::new(2, Duration::from_secs(60)),
            true,
            counting_fetcher(calls.clone()),
            None,
        );

        let snap = query.fetch().await;
        assert_eq!(snap.data.as_deref(), Some(&1));
        assert!(snap.error.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_hit_serves_cached_value() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicU32::new(0));
        let query = Query::new(
            cache,
            "k",
            QueryPolicy::new(2, Duration::from_secs(60)),
            true,
            counting_fetcher(calls.clone()),
            None,
        );

        query.fetch().await;
        let second = query.fetch().await;
        assert_eq!(second.data.as_deref(), Some(&1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_read_serves_old_value_and_revalidates() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicU32::new(0));
        let query = Query::new(
            cache,
            "k",
            QueryPolicy::new(2, Duration::from_secs(10)),
            true,
            counting_fetcher(calls.clone()),
            None,
        );

        query.fetch().await;
        tokio::time::advance(Duration::from_secs(11)).await;

        let stale = query.fetch().await;
        assert_eq!(stale.data.as_deref(), Some(&1));

        let refreshed = wait_until(&query, |s| s.data.as_deref() == Some(&2)).await;
        assert!(!refreshed.fetching);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_retry_to_policy_count() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicU32::new(0));
        let query = Query::new(
            cache,
            "k",
            QueryPolicy::new(2, Duration::from_secs(60)),
            true,
            flaky_fetcher(calls.clone(), 2, connection_error),
            None,
        );

        let snap = query.fetch().await;
        assert_eq!(snap.data.as_deref(), Some(&3));
        assert!(snap.error.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_error_and_keep_stale_data() {
        let calls = Arc::new(AtomicU32::new(0));
        let failures = Arc::new(AtomicU32::new(0));
        let failures_seen = failures.clone();

        // Succeeds once, then always fails.
        let fetcher: Fetcher<u32> = {
            let calls = calls.clone();
            Arc::new(move || {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n == 1 {
                        Ok(n)
                    } else {
                        Err(connection_error())
                    }
                }
                .boxed()
            })
        };

        let query = Query::new(
            QueryCache::new(),
            "k",
            QueryPolicy::new(2, Duration::from_secs(10)),
            true,
            fetcher,
            Some(Arc::new(move |_e| {
                failures_seen.fetch_add(1, Ordering::SeqCst);
            })),
        );

        query.fetch().await;
        tokio::time::advance(Duration::from_secs(11)).await;
        query.fetch().await;

        let snap = wait_until(&query, |s| s.error.is_some()).await;
        // 1 success + 1 initial failed attempt + 2 retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(snap.data.as_deref(), Some(&1));
        assert!(matches!(
            &*snap.error.unwrap(),
            OddsError::Api(ApiError::Connection(_))
        ));
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_key_is_not_retried() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicU32::new(0));
        let query = Query::new(
            cache,
            "k",
            QueryPolicy::new(2, Duration::from_secs(60)),
            true,
            flaky_fetcher(calls.clone(), u32::MAX, || {
                OddsError::Api(ApiError::KeyRequired)
            }),
            None,
        );

        let snap = query.fetch().await;
        assert!(matches!(
            &*snap.error.unwrap(),
            OddsError::Api(ApiError::KeyRequired)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_query_never_fetches() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicU32::new(0));
        let query = Query::new(
            cache,
            "k",
            QueryPolicy::new(2, Duration::from_secs(60)),
            false,
            counting_fetcher(calls.clone()),
            None,
        );

        let snap = query.fetch().await;
        assert!(snap.data.is_none());
        assert!(snap.error.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_reads_collapse_into_one_fetch() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicU32::new(0));

        let fetcher: Fetcher<u32> = {
            let calls = calls.clone();
            Arc::new(move || {
                let calls = calls.clone();
                async move {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)
                }
                .boxed()
            })
        };

        let policy = QueryPolicy::new(0, Duration::from_secs(60));
        let a = Query::new(cache.clone(), "k", policy, true, fetcher.clone(), None);
        let b = Query::new(cache, "k", policy, true, fetcher, None);

        let (snap_a, _snap_b) = tokio::join!(a.fetch(), b.fetch());
        assert_eq!(snap_a.data.as_deref(), Some(&1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_refetches_on_interval() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicU32::new(0));
        let query = Query::new(
            cache,
            "k",
            QueryPolicy::new(1, Duration::from_secs(10)).with_poll(Duration::from_secs(30)),
            true,
            counting_fetcher(calls.clone()),
            None,
        );

        query.fetch().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        wait_until(&query, |s| s.data.as_deref() == Some(&2)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_cancels_polling() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicU32::new(0));
        let query = Query::new(
            cache,
            "k",
            QueryPolicy::new(1, Duration::from_secs(10)).with_poll(Duration::from_secs(30)),
            true,
            counting_fetcher(calls.clone()),
            None,
        );

        query.fetch().await;
        drop(query);

        tokio::time::advance(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_refetch_on_next_access() {
        let cache = QueryCache::new();
        let calls = Arc::new(AtomicU32::new(0));
        let query = Query::new(
            cache.clone(),
            "k",
            QueryPolicy::new(2, Duration::from_secs(3600)),
            true,
            counting_fetcher(calls.clone()),
            None,
        );

        query.fetch().await;
        cache.invalidate("k");

        let stale = query.fetch().await;
        assert_eq!(stale.data.as_deref(), Some(&1));
        wait_until(&query, |s| s.data.as_deref() == Some(&2)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
