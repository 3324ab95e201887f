//! Odds provider API client wrapper.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::metrics;
use crate::storage::KeyStore;

use super::types::{Event, MarketKey, QuotaInfo, Sport};

/// Credential state. A key restored from the store or the environment does
/// not count as initialized; only an explicit `set_api_key` call does.
#[derive(Debug, Default)]
struct KeyState {
    key: String,
    initialized: bool,
}

/// REST client for the odds provider.
///
/// Single point of contact with the remote API: owns the HTTP client, the
/// credential state, and request construction. Transport failures are
/// translated into [`ApiError`] variants; no retry happens here.
#[derive(Debug)]
pub struct OddsClient {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// Base URL of the sports listing endpoint, no trailing slash.
    base_url: String,
    /// Default region set for odds requests.
    default_regions: String,
    /// Default look-back window for score requests.
    default_days_from: u32,
    /// Credential state.
    key: RwLock<KeyState>,
    /// Last request quota reported by the provider.
    quota: RwLock<Option<QuotaInfo>>,
    /// Key persistence boundary.
    store: KeyStore,
}

impl OddsClient {
    /// Create a new client from config.
    ///
    /// Seeds the in-memory key from the environment or the key store, without
    /// marking the client as configured.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            // Fast connection establishment
            .connect_timeout(Duration::from_millis(2_000))
            // Keep connections alive for reuse
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(config.http_pool_size)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        let store = KeyStore::new(&config.key_store_path);
        let key = match config.odds_api_key.as_deref() {
            Some(k) if !k.is_empty() => k.to_string(),
            _ => store.load()?.unwrap_or_default(),
        };

        Ok(Self {
            http,
            base_url: config.base_url_trimmed().to_string(),
            default_regions: config.default_regions.clone(),
            default_days_from: config.scores_days_from,
            key: RwLock::new(KeyState {
                key,
                initialized: false,
            }),
            quota: RwLock::new(None),
            store,
        })
    }

    /// Store the key in memory and in the key store, and mark the client as
    /// configured. The key is not validated.
    pub fn set_api_key(&self, key: &str) -> Result<()> {
        {
            let mut state = self.key.write().unwrap();
            state.key = key.to_string();
            state.initialized = true;
        }
        self.store.save(key)
    }

    /// Current in-memory key.
    pub fn api_key(&self) -> String {
        self.key.read().unwrap().key.clone()
    }

    /// True iff `set_api_key` has been called this session with a non-empty
    /// key. A key restored from the store at startup does not count.
    pub fn is_configured(&self) -> bool {
        let state = self.key.read().unwrap();
        state.initialized && !state.key.is_empty()
    }

    /// Last request quota reported by the provider, if any response carried
    /// quota headers.
    pub fn quota(&self) -> Option<QuotaInfo> {
        *self.quota.read().unwrap()
    }

    /// One-off request against the base listing endpoint with the given key,
    /// independent of stored credential state.
    ///
    /// Returns `Ok(true)` on HTTP 200; 401 maps to [`ApiError::KeyInvalid`],
    /// 429 to [`ApiError::RateLimited`], anything else to
    /// [`ApiError::Connection`].
    #[instrument(skip(self, key))]
    pub async fn test_connection(&self, key: &str) -> Result<bool> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[("apiKey", key)])
            .send()
            .await
            .map_err(|e| ApiError::Connection(e.to_string()))?;

        self.record_quota(&response);

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED => Err(ApiError::KeyInvalid.into()),
            StatusCode::TOO_MANY_REQUESTS => Err(ApiError::RateLimited.into()),
            s => Err(ApiError::Connection(format!("HTTP {}", s)).into()),
        }
    }

    /// List all sports known to the provider.
    #[instrument(skip(self))]
    pub async fn get_sports(&self) -> Result<Vec<Sport>> {
        self.request("sports", String::new(), &[]).await
    }

    /// Head-to-head odds for a sport. `regions` falls back to the configured
    /// default region set.
    #[instrument(skip(self), fields(sport_key = %sport_key))]
    pub async fn get_odds(&self, sport_key: &str, regions: Option<&str>) -> Result<Vec<Event>> {
        let regions = regions.unwrap_or(&self.default_regions).to_string();
        self.request(
            "odds",
            format!("/{}/odds", sport_key),
            &[
                ("regions", regions),
                ("markets", MarketKey::H2h.to_string()),
            ],
        )
        .await
    }

    /// In-play events with head-to-head quotes for a sport.
    #[instrument(skip(self), fields(sport_key = %sport_key))]
    pub async fn get_live_events(&self, sport_key: &str) -> Result<Vec<Event>> {
        self.request(
            "odds-live",
            format!("/{}/odds-live", sport_key),
            &[("markets", MarketKey::H2h.to_string())],
        )
        .await
    }

    /// Recent scores for a sport, looking back `days_from` days (default from
    /// config, normally 1).
    #[instrument(skip(self), fields(sport_key = %sport_key))]
    pub async fn get_scores(&self, sport_key: &str, days_from: Option<u32>) -> Result<Vec<Event>> {
        let days = days_from.unwrap_or(self.default_days_from);
        self.request(
            "scores",
            format!("/{}/scores", sport_key),
            &[("daysFrom", days.to_string())],
        )
        .await
    }

    /// Shared request path for all data fetches.
    ///
    /// Fails fast with [`ApiError::KeyRequired`] before any network I/O when
    /// no key is present.
    async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        path: String,
        params: &[(&str, String)],
    ) -> Result<T> {
        let key = self.api_key();
        if key.is_empty() {
            return Err(ApiError::KeyRequired.into());
        }

        let url = format!("{}{}", self.base_url, path);
        debug!(endpoint, url = %url, "Issuing provider request");

        let mut request = self.http.get(&url).query(&[("apiKey", key.as_str())]);
        for (name, value) in params {
            request = request.query(&[(*name, value.as_str())]);
        }

        let start = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Connection(e.to_string()))?;
        metrics::record_http_latency(start, endpoint);

        self.record_quota(&response);

        match response.status() {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED => return Err(ApiError::KeyInvalid.into()),
            StatusCode::TOO_MANY_REQUESTS => return Err(ApiError::RateLimited.into()),
            s => return Err(ApiError::Connection(format!("HTTP {}", s)).into()),
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Connection(e.to_string()))?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Record quota headers when the provider sends them.
    fn record_quota(&self, response: &reqwest::Response) {
        let header = |name: &str| -> Option<u32> {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
        };

        let remaining = header("x-requests-remaining");
        let used = header("x-requests-used");
        if remaining.is_some() || used.is_some() {
            *self.quota.write().unwrap() = Some(QuotaInfo { remaining, used });
        }
    }

    /// Base URL the client was constructed with.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &tempfile::TempDir) -> Config {
        Config {
            key_store_path: dir
                .path()
                .join("keystore.json")
                .to_string_lossy()
                .into_owned(),
            ..Config::default()
        }
    }

    #[test]
    fn client_creation_works() {
        let dir = tempfile::tempdir().unwrap();
        let client = OddsClient::new(&test_config(&dir)).unwrap();
        assert_eq!(client.base_url(), "https://api.the-odds-api.com/v4/sports");
        assert_eq!(client.api_key(), "");
        assert!(!client.is_configured());
    }

    #[test]
    fn stored_key_is_loaded_but_does_not_configure() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        KeyStore::new(&config.key_store_path).save("stored-key").unwrap();

        let client = OddsClient::new(&config).unwrap();
        assert_eq!(client.api_key(), "stored-key");
        // Keys from a prior session only become active after an explicit
        // set_api_key call.
        assert!(!client.is_configured());
    }

    #[test]
    fn set_api_key_configures_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);

        let client = OddsClient::new(&config).unwrap();
        client.set_api_key("fresh-key").unwrap();
        assert!(client.is_configured());
        assert_eq!(client.api_key(), "fresh-key");

        let stored = KeyStore::new(&config.key_store_path).load().unwrap();
        assert_eq!(stored.as_deref(), Some("fresh-key"));
    }

    #[test]
    fn empty_key_never_configures() {
        let dir = tempfile::tempdir().unwrap();
        let client = OddsClient::new(&test_config(&dir)).unwrap();
        client.set_api_key("").unwrap();
        assert!(!client.is_configured());
    }

    #[test]
    fn env_seeded_key_does_not_configure() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            odds_api_key: Some("env-key".to_string()),
            ..test_config(&dir)
        };

        let client = OddsClient::new(&config).unwrap();
        assert_eq!(client.api_key(), "env-key");
        assert!(!client.is_configured());
    }
}
