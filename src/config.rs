//! Application configuration loaded from environment variables.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Provider ===
    /// Base URL of the provider's sports listing endpoint.
    #[serde(default = "default_base_url")]
    pub odds_base_url: String,

    /// Optional API key seeded from the environment.
    ///
    /// Seeding a key here behaves like a key restored from the key store: it
    /// is available for requests but does not mark the client as configured.
    #[serde(default)]
    pub odds_api_key: Option<String>,

    /// Path of the JSON key store file.
    #[serde(default = "default_key_store_path")]
    pub key_store_path: String,

    /// Default region set for odds requests (comma-separated).
    #[serde(default = "default_regions")]
    pub default_regions: String,

    /// Default look-back window in days for score requests.
    #[serde(default = "default_days_from")]
    pub scores_days_from: u32,

    // === HTTP ===
    /// Request timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Connection pool size per host.
    #[serde(default = "default_http_pool_size")]
    pub http_pool_size: usize,

    // === Observability ===
    /// Enable the Prometheus scrape endpoint in watch mode.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Prometheus exporter port.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_base_url() -> String {
    "https://api.the-odds-api.com/v4/sports".to_string()
}

fn default_key_store_path() -> String {
    ".oddswatch/keystore.json".to_string()
}

fn default_regions() -> String {
    "eu".to_string()
}

fn default_days_from() -> u32 {
    1
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

fn default_http_pool_size() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        let url = url::Url::parse(&self.odds_base_url)
            .map_err(|e| format!("ODDS_BASE_URL is not a valid URL: {}", e))?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err("ODDS_BASE_URL must be an http(s) URL".to_string());
        }

        if self.http_timeout_ms == 0 {
            return Err("HTTP_TIMEOUT_MS must be greater than 0".to_string());
        }

        if self.default_regions.is_empty() {
            return Err("DEFAULT_REGIONS must not be empty".to_string());
        }

        Ok(())
    }

    /// Base URL with any trailing slash removed.
    pub fn base_url_trimmed(&self) -> &str {
        self.odds_base_url.trim_end_matches('/')
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            odds_base_url: default_base_url(),
            odds_api_key: None,
            key_store_path: default_key_store_path(),
            default_regions: default_regions(),
            scores_days_from: default_days_from(),
            http_timeout_ms: default_http_timeout_ms(),
            http_pool_size: default_http_pool_size(),
            metrics_enabled: default_true(),
            metrics_port: default_metrics_port(),
            rust_log: default_log_level(),
            verbose: false,
        }
    }
}
