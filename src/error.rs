//! Unified error types for the odds client.

use thiserror::Error;

/// Unified error type for the odds client and query layer.
#[derive(Error, Debug)]
pub enum OddsError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Provider API error.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// HTTP client construction error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised on the provider request path.
///
/// Every data fetch and the one-off connection test map onto this taxonomy;
/// downstream code matches on the variant, never on message text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// No API key has been set; the request was never sent.
    #[error("api key required")]
    KeyRequired,

    /// The provider rejected the key (HTTP 401).
    #[error("api key invalid")]
    KeyInvalid,

    /// The provider throttled the request (HTTP 429).
    #[error("rate limited")]
    RateLimited,

    /// Any other transport failure: timeout, DNS, 5xx, dropped connection.
    #[error("connection error: {0}")]
    Connection(String),
}

impl ApiError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Retrying without a key, or with a rejected key, cannot; the query
    /// layer surfaces those immediately instead of burning retry attempts.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::RateLimited | ApiError::Connection(_))
    }
}

impl OddsError {
    /// Whether the query layer should retry this error.
    pub fn is_transient(&self) -> bool {
        match self {
            OddsError::Api(e) => e.is_transient(),
            OddsError::Http(_) => true,
            _ => false,
        }
    }
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, OddsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_errors_are_not_transient() {
        assert!(!ApiError::KeyRequired.is_transient());
        assert!(!ApiError::KeyInvalid.is_transient());
    }

    #[test]
    fn rate_limit_and_connection_are_transient() {
        assert!(ApiError::RateLimited.is_transient());
        assert!(ApiError::Connection("timeout".to_string()).is_transient());
    }

    #[test]
    fn wrapped_api_errors_keep_transience() {
        let conn = OddsError::Api(ApiError::Connection("HTTP 503".to_string()));
        assert!(conn.is_transient());
        assert!(!OddsError::Api(ApiError::KeyRequired).is_transient());
    }
}
