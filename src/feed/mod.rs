//! Provider feed: entity types and the REST client.
//!
//! This module handles:
//! - Entity types for provider payloads
//! - The API client and its credential state
//! - Request construction and error translation

pub mod client;
pub mod types;

pub use client::OddsClient;
pub use types::{Bookmaker, Event, Market, MarketKey, Outcome, QuotaInfo, Sport};
