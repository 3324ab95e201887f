//! Cached client for The Odds API.
//!
//! This library wraps the v4 REST API at `api.the-odds-api.com` behind a
//! typed client and a small stale-while-revalidate query cache, so consumers
//! read sports, odds, live events, and scores through cache-keyed queries
//! instead of raw HTTP calls.
//!
//! # Reading data
//!
//! ```text
//! Config -> OddsClient (owns the API key)
//!               |
//!       queries::odds_query("soccer_epl")
//!               |
//!        QueryCache (retry, staleness, polling)
//! ```
//!
//! Every query is disabled until an API key has been set through
//! [`feed::OddsClient::set_api_key`]; live-event queries poll on a fixed
//! interval for as long as their handle is alive.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`storage`]: API-key persistence
//! - [`feed`]: Provider entities and the REST client
//! - [`cache`]: Generic query cache with retry and polling
//! - [`queries`]: Per-entity query constructors
//! - [`metrics`]: Metric names and recording helpers
//! - [`utils`]: Utility functions

pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod metrics;
pub mod queries;
pub mod storage;
pub mod utils;

pub use cache::{Query, QueryCache, QueryPolicy};
pub use config::Config;
pub use error::{ApiError, OddsError, Result};
pub use feed::OddsClient;
