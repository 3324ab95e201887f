//! Entity types for provider payloads.
//!
//! Everything here is an immutable snapshot deserialized straight from the
//! provider; nothing is persisted or mutated after parsing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::{Display, EnumString};
use time::OffsetDateTime;

/// A sport known to the provider.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Sport {
    /// Unique sport identifier (e.g. "soccer_epl").
    pub key: String,
    /// Sport group (e.g. "Soccer").
    pub group: String,
    /// Display title.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// Whether the sport currently has events.
    pub active: bool,
    /// Whether outright (futures) markets are offered.
    pub has_outrights: bool,
}

/// One sporting fixture with current market data.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Event {
    /// Provider event id.
    pub id: String,
    /// Sport key the event belongs to.
    pub sport_key: String,
    /// Sport display title.
    pub sport_title: String,
    /// Scheduled start time.
    #[serde(with = "time::serde::rfc3339")]
    pub commence_time: OffsetDateTime,
    /// Home team name.
    pub home_team: String,
    /// Away team name.
    pub away_team: String,
    /// Bookmaker quotes. Absent on score payloads.
    #[serde(default)]
    pub bookmakers: Vec<Bookmaker>,
}

impl Event {
    /// Time until the event starts, if it has not started yet.
    pub fn commence_in(&self) -> Option<std::time::Duration> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let remaining = self.commence_time.unix_timestamp() - now;
        if remaining <= 0 {
            None
        } else {
            Some(std::time::Duration::from_secs(remaining as u64))
        }
    }

    /// Format time-to-start as "Xm Ys", or "LIVE" once started.
    pub fn commence_str(&self) -> String {
        match self.commence_in() {
            Some(duration) => {
                let secs = duration.as_secs();
                format!("{}m {}s", secs / 60, secs % 60)
            }
            None => "LIVE".to_string(),
        }
    }
}

/// One bookmaker's quotes for an event.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Bookmaker {
    /// Bookmaker identifier.
    pub key: String,
    /// Display title.
    pub title: String,
    /// When the bookmaker last refreshed these quotes.
    #[serde(with = "time::serde::rfc3339")]
    pub last_update: OffsetDateTime,
    /// Quoted markets.
    #[serde(default)]
    pub markets: Vec<Market>,
}

/// A quoted market (e.g. head-to-head) within a bookmaker.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Market {
    /// Market key as sent by the provider.
    pub key: String,
    /// Outcomes quoted in this market. Head-to-head carries two or three.
    #[serde(default)]
    pub outcomes: SmallVec<[Outcome; 3]>,
}

/// A single priced outcome.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Outcome {
    /// Outcome name, usually a team name or "Draw".
    pub name: String,
    /// Decimal price.
    pub price: Decimal,
}

/// Market kinds usable in request parameters.
///
/// Data fetches in this crate pin `markets` to head-to-head.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MarketKey {
    /// Head-to-head (moneyline) market.
    #[default]
    H2h,
    /// Point spread market.
    Spreads,
    /// Totals (over/under) market.
    Totals,
    /// Outright (futures) market.
    Outrights,
}

/// Request quota reported by the provider on every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaInfo {
    /// Requests remaining this period (`x-requests-remaining`).
    pub remaining: Option<u32>,
    /// Requests used this period (`x-requests-used`).
    pub used: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn market_key_serializes_lowercase() {
        assert_eq!(MarketKey::H2h.to_string(), "h2h");
        assert_eq!(MarketKey::Outrights.to_string(), "outrights");
    }

    #[test]
    fn market_key_parses_from_string() {
        use std::str::FromStr;
        assert_eq!(MarketKey::from_str("h2h").unwrap(), MarketKey::H2h);
        assert_eq!(MarketKey::from_str("totals").unwrap(), MarketKey::Totals);
    }

    #[test]
    fn sport_deserializes_provider_payload() {
        let raw = r#"[{"key":"soccer_epl","group":"Soccer","title":"EPL","description":"English Premier League","active":true,"has_outrights":false}]"#;
        let sports: Vec<Sport> = serde_json::from_str(raw).unwrap();
        assert_eq!(sports.len(), 1);
        assert_eq!(sports[0].key, "soccer_epl");
        assert_eq!(sports[0].group, "Soccer");
        assert!(sports[0].active);
        assert!(!sports[0].has_outrights);
    }

    #[test]
    fn event_deserializes_nested_quotes() {
        let raw = r#"{
            "id": "e912305910e2bdc1a87131fc1f60e0ba",
            "sport_key": "soccer_epl",
            "sport_title": "EPL",
            "commence_time": "2026-08-09T14:00:00Z",
            "home_team": "Arsenal",
            "away_team": "Chelsea",
            "bookmakers": [{
                "key": "pinnacle",
                "title": "Pinnacle",
                "last_update": "2026-08-06T10:44:09Z",
                "markets": [{
                    "key": "h2h",
                    "outcomes": [
                        {"name": "Arsenal", "price": 2.10},
                        {"name": "Chelsea", "price": 3.40},
                        {"name": "Draw", "price": 3.25}
                    ]
                }]
            }]
        }"#;

        let event: Event = serde_json::from_str(raw).unwrap();
        assert_eq!(event.home_team, "Arsenal");
        assert_eq!(event.bookmakers.len(), 1);

        let market = &event.bookmakers[0].markets[0];
        assert_eq!(market.key, "h2h");
        assert_eq!(market.outcomes.len(), 3);
        assert_eq!(market.outcomes[0].price, dec!(2.10));
    }

    #[test]
    fn score_payload_without_bookmakers_deserializes() {
        let raw = r#"{
            "id": "a512305910e2bdc1a87131fc1f60e0ba",
            "sport_key": "soccer_epl",
            "sport_title": "EPL",
            "commence_time": "2026-08-05T14:00:00Z",
            "home_team": "Arsenal",
            "away_team": "Chelsea"
        }"#;

        let event: Event = serde_json::from_str(raw).unwrap();
        assert!(event.bookmakers.is_empty());
    }

    #[test]
    fn past_event_reports_live() {
        let raw = r#"{
            "id": "x",
            "sport_key": "soccer_epl",
            "sport_title": "EPL",
            "commence_time": "2020-01-01T00:00:00Z",
            "home_team": "A",
            "away_team": "B"
        }"#;
        let event: Event = serde_json::from_str(raw).unwrap();
        assert_eq!(event.commence_in(), None);
        assert_eq!(event.commence_str(), "LIVE");
    }
}
