//! Per-entity query constructors.
//!
//! One constructor per entity kind, each registering its fetch under a fixed
//! cache key with the declared retry/staleness/polling policy. Every query is
//! gated on the client being configured; terminal failures are logged with a
//! user-facing message and otherwise left untouched for the consumer.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::error;

use crate::cache::{Fetcher, Query, QueryCache, QueryPolicy};
use crate::error::{ApiError, OddsError};
use crate::feed::{Event, OddsClient, Sport};

/// Cache key for the sports listing.
pub const SPORTS_KEY: &str = "sports";

/// Poll interval for live-event queries.
pub const LIVE_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Cache key for odds on a sport.
pub fn odds_key(sport_key: &str) -> String {
    format!("odds:{}", sport_key)
}

/// Cache key for live events on a sport.
pub fn live_events_key(sport_key: &str) -> String {
    format!("live-events:{}", sport_key)
}

/// Cache key for scores on a sport.
pub fn scores_key(sport_key: &str) -> String {
    format!("scores:{}", sport_key)
}

/// User-facing message for an error.
///
/// Fixed text per API error kind; anything else falls through to the raw
/// error display.
pub fn user_message(error: &OddsError) -> String {
    match error {
        OddsError::Api(ApiError::KeyRequired) => {
            "API key not configured. Set your API key before fetching data.".to_string()
        }
        OddsError::Api(ApiError::KeyInvalid) => {
            "API key invalid. Check your API key.".to_string()
        }
        OddsError::Api(ApiError::RateLimited) => {
            "API request limit reached. Try again later.".to_string()
        }
        OddsError::Api(ApiError::Connection(_)) => {
            "Could not reach the odds provider. Check your connection.".to_string()
        }
        other => other.to_string(),
    }
}

fn log_failure(what: String) -> Arc<dyn Fn(&OddsError) + Send + Sync> {
    Arc::new(move |e| error!("Failed to fetch {}: {}", what, user_message(e)))
}

/// Sports listing: cached 5 minutes, retried twice.
pub fn sports_query(cache: &Arc<QueryCache>, client: &Arc<OddsClient>) -> Query<Vec<Sport>> {
    let c = client.clone();
    let fetcher: Fetcher<Vec<Sport>> = Arc::new(move || {
        let c = c.clone();
        async move { c.get_sports().await }.boxed()
    });

    Query::new(
        cache.clone(),
        SPORTS_KEY,
        QueryPolicy::new(2, Duration::from_secs(300)),
        client.is_configured(),
        fetcher,
        Some(log_failure("sports".to_string())),
    )
}

/// Head-to-head odds for a sport: cached 1 minute, retried twice. Regions
/// follow the client's configured default.
pub fn odds_query(
    cache: &Arc<QueryCache>,
    client: &Arc<OddsClient>,
    sport_key: &str,
) -> Query<Vec<Event>> {
    let c = client.clone();
    let sport = sport_key.to_string();
    let fetcher: Fetcher<Vec<Event>> = Arc::new(move || {
        let c = c.clone();
        let sport = sport.clone();
        async move { c.get_odds(&sport, None).await }.boxed()
    });

    Query::new(
        cache.clone(),
        odds_key(sport_key),
        QueryPolicy::new(2, Duration::from_secs(60)),
        client.is_configured(),
        fetcher,
        Some(log_failure(format!("odds for {}", sport_key))),
    )
}

/// Live events for a sport: cached 10 seconds, retried once, polled every 30
/// seconds while the handle is alive.
pub fn live_events_query(
    cache: &Arc<QueryCache>,
    client: &Arc<OddsClient>,
    sport_key: &str,
) -> Query<Vec<Event>> {
    let c = client.clone();
    let sport = sport_key.to_string();
    let fetcher: Fetcher<Vec<Event>> = Arc::new(move || {
        let c = c.clone();
        let sport = sport.clone();
        async move { c.get_live_events(&sport).await }.boxed()
    });

    Query::new(
        cache.clone(),
        live_events_key(sport_key),
        QueryPolicy::new(1, Duration::from_secs(10)).with_poll(LIVE_POLL_INTERVAL),
        client.is_configured(),
        fetcher,
        Some(log_failure(format!("live events for {}", sport_key))),
    )
}

/// Recent scores for a sport: cached 1 minute, retried twice.
pub fn scores_query(
    cache: &Arc<QueryCache>,
    client: &Arc<OddsClient>,
    sport_key: &str,
) -> Query<Vec<Event>> {
    let c = client.clone();
    let sport = sport_key.to_string();
    let fetcher: Fetcher<Vec<Event>> = Arc::new(move || {
        let c = c.clone();
        let sport = sport.clone();
        async move { c.get_scores(&sport, None).await }.boxed()
    });

    Query::new(
        cache.clone(),
        scores_key(sport_key),
        QueryPolicy::new(2, Duration::from_secs(60)),
        client.is_configured(),
        fetcher,
        Some(log_failure(format!("scores for {}", sport_key))),
    )
}
