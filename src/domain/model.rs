//! Persisted entities and the wire-shaped value types that flow through
//! the engine (§3 of the design).

use crate::domain::identifier::Granularity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A rate is always stored in the destination's smallest unit per
/// source's smallest unit. Plain `f64` -- the normalisation invariant is
/// enforced at the single conversion site (`CurrencyRegistry::to_cent_sat_rate`),
/// not by the type.
pub type Rate = f64;

/// Reserved key denoting the most recent, not-yet-closed bucket.
pub const LATEST_KEY: &str = "latest";

/// Mapping from bucket-key to rate, with an optional reserved `latest` entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Histo(pub BTreeMap<String, Rate>);

impl Histo {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn latest(&self) -> Option<Rate> {
        self.0.get(LATEST_KEY).copied()
    }

    pub fn set_latest(&mut self, rate: Rate) {
        self.0.insert(LATEST_KEY.to_string(), rate);
    }

    /// Non-`latest` keys, each resolved to the instant its bucket-key
    /// names -- these are the "days" set the stats deriver walks.
    pub fn dated_entries(&self, g: Granularity) -> Vec<(DateTime<Utc>, Rate)> {
        self.0
            .iter()
            .filter(|(k, _)| k.as_str() != LATEST_KEY)
            .filter_map(|(k, v)| g.parse_key(k).map(|t| (t, *v)))
            .collect()
    }

    /// Retain only the given keys (used by `getHisto`'s `at` filter).
    pub fn retain_keys(&self, keys: &[String]) -> Histo {
        let set: std::collections::HashSet<&str> = keys.iter().map(|s| s.as_str()).collect();
        Histo(
            self.0
                .iter()
                .filter(|(k, _)| set.contains(k.as_str()))
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        )
    }

    /// Retain only keys whose parsed instant is strictly after `after`.
    /// `latest` is never filtered by `after` -- the caller adds it back
    /// in explicitly via `PairData`.
    pub fn retain_after(&self, g: Granularity, after: Option<DateTime<Utc>>) -> Histo {
        let Some(after) = after else {
            return self.clone();
        };
        Histo(
            self.0
                .iter()
                .filter(|(k, _)| {
                    k.as_str() == LATEST_KEY
                        || g.parse_key(k).map(|t| t > after).unwrap_or(false)
                })
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        )
    }
}

/// A single OHLCVR point as produced by a provider, pre-sort.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OhlcvrPoint {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A raw streamed price update from a provider subscription, already
/// filtered to supported tickers but not yet converted to centSat units.
#[derive(Debug, Clone)]
pub struct PriceUpdate {
    pub pair_exchange_id: String,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeRecord {
    pub id: String,
    pub name: String,
    pub website: Option<String>,
}

/// Per-granularity derived statistics, kept as a partial struct so a
/// merge only sets the fields it actually computed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PairExchangeStats {
    pub has_history_for_30_last_days: Option<bool>,
    pub has_history_for_1_year: Option<bool>,
    pub oldest_day_ago: Option<i64>,
    pub yesterday_volume: Option<f64>,
    pub history_loaded_at_daily: Option<String>,
    pub history_loaded_at_hourly: Option<String>,
    pub latest_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairExchangeRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub exchange: String,
    pub from: String,
    pub to: String,
    pub from_to: String,
    pub histo_daily: Histo,
    pub histo_hourly: Histo,
    pub latest: Rate,
    pub latest_date: Option<DateTime<Utc>>,
    pub yesterday_volume: f64,
    pub oldest_day_ago: Option<i64>,
    pub has_history_for_1_year: bool,
    pub has_history_for_30_last_days: bool,
    pub history_loaded_at_daily: Option<String>,
    pub history_loaded_at_hourly: Option<String>,
}

impl PairExchangeRecord {
    /// Fresh default record as created on first sight by the
    /// available-pair-exchanges refresh -- optimistic 30-day flag, no
    /// 1-year history yet, zero live rate.
    pub fn new_default(exchange: &str, from: &str, to: &str) -> Self {
        let id = crate::domain::identifier::build_id(exchange, from, to);
        Self {
            id,
            exchange: exchange.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            from_to: format!("{from}_{to}"),
            histo_daily: Histo::new(),
            histo_hourly: Histo::new(),
            latest: 0.0,
            latest_date: None,
            yesterday_volume: 0.0,
            oldest_day_ago: None,
            has_history_for_1_year: false,
            has_history_for_30_last_days: true,
            history_loaded_at_daily: None,
            history_loaded_at_hourly: None,
        }
    }

    pub fn histo(&self, g: Granularity) -> &Histo {
        match g {
            Granularity::Daily => &self.histo_daily,
            Granularity::Hourly => &self.histo_hourly,
        }
    }

    pub fn history_loaded_at(&self, g: Granularity) -> Option<&str> {
        match g {
            Granularity::Daily => self.history_loaded_at_daily.as_deref(),
            Granularity::Hourly => self.history_loaded_at_hourly.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketCapSnapshot {
    #[serde(rename = "_id")]
    pub day: String,
    pub coins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub last_live_rates_sync: DateTime<Utc>,
    pub last_market_cap_sync: DateTime<Utc>,
}

impl Default for Meta {
    /// Zero-instant defaults when the `meta_1` document is absent,
    /// resolving Open Question 3.
    fn default() -> Self {
        let epoch = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        Self {
            last_live_rates_sync: epoch,
            last_market_cap_sync: epoch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histo_latest_round_trip() {
        let mut h = Histo::new();
        h.set_latest(1.23);
        assert_eq!(h.latest(), Some(1.23));
    }

    #[test]
    fn retain_keys_empty_result_when_none_match() {
        let mut h = Histo::new();
        h.0.insert("2024-01-01".into(), 1.0);
        let filtered = h.retain_keys(&["2024-02-02".into()]);
        assert!(filtered.0.is_empty());
    }

    #[test]
    fn retain_after_none_returns_everything() {
        let mut h = Histo::new();
        h.0.insert("2024-01-01".into(), 1.0);
        h.set_latest(2.0);
        let filtered = h.retain_after(Granularity::Daily, None);
        assert_eq!(filtered.0.len(), 2);
    }
}
