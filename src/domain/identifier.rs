//! Identifier Codec (component B): canonical PairExchange ids and
//! granularity bucket-key formatting.

use crate::domain::currency::Ticker;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unordered attribute pair, used when the exchange does not matter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pair {
    pub from: Ticker,
    pub to: Ticker,
}

impl Pair {
    pub fn new(from: Ticker, to: Ticker) -> Self {
        Self { from, to }
    }

    /// Index key used by the store for pair lookups (`from_to`).
    pub fn from_to(&self) -> String {
        format!("{}_{}", self.from, self.to)
    }
}

/// Ordered triple: a specific exchange's offering of a specific pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairExchange {
    pub exchange: String,
    pub from: Ticker,
    pub to: Ticker,
}

impl PairExchange {
    pub fn new(exchange: impl Into<String>, from: Ticker, to: Ticker) -> Self {
        Self {
            exchange: exchange.into(),
            from,
            to,
        }
    }

    /// Canonical id: `EXCHANGE_FROM_TO`. Exchange id is kept verbatim
    /// (case preserved) -- blacklisting compares case-insensitively but
    /// storage does not lowercase it.
    pub fn id(&self) -> String {
        build_id(&self.exchange, self.from.as_str(), self.to.as_str())
    }

    pub fn pair(&self) -> Pair {
        Pair::new(self.from.clone(), self.to.clone())
    }
}

pub fn build_id(exchange: &str, from: &str, to: &str) -> String {
    format!("{}_{}_{}", exchange, from, to)
}

/// Inverse of `build_id`/`PairExchange::id`. Exchange ids never contain
/// `_`, so splitting into exactly three `_`-separated parts recovers the
/// triple unambiguously given the tickers are also `_`-free.
pub fn parse_id(id: &str) -> Option<(String, Ticker, Ticker)> {
    let mut parts = id.splitn(3, '_');
    let exchange = parts.next()?;
    let from = parts.next()?;
    let to = parts.next()?;
    Some((exchange.to_string(), Ticker::new(from), Ticker::new(to)))
}

/// Closed enumeration of supported bucket granularities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    Daily,
    Hourly,
}

impl Granularity {
    pub const fn bucket_ms(self) -> i64 {
        match self {
            Granularity::Daily => 86_400_000,
            Granularity::Hourly => 3_600_000,
        }
    }

    /// Canonical textual bucket-key for the bucket containing `at`.
    pub fn format_time(self, at: DateTime<Utc>) -> String {
        match self {
            Granularity::Daily => at.format("%Y-%m-%d").to_string(),
            Granularity::Hourly => at.format("%Y-%m-%dT%H").to_string(),
        }
    }

    /// Inverse of `format_time`: recovers the instant at the start of the
    /// bucket named by `key`. Hourly keys get `:00:00` appended so the
    /// recovered instant is unambiguous.
    pub fn parse_key(self, key: &str) -> Option<DateTime<Utc>> {
        match self {
            Granularity::Daily => {
                let date = NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()?;
                let dt = date.and_hms_opt(0, 0, 0)?;
                Some(Utc.from_utc_datetime(&dt))
            }
            Granularity::Hourly => {
                let with_minutes = format!("{}:00:00", key);
                let dt = NaiveDateTime::parse_from_str(&with_minutes, "%Y-%m-%dT%H:%M:%S").ok()?;
                Some(Utc.from_utc_datetime(&dt))
            }
        }
    }

    /// The current bucket-key for `now`, used by the refresh fast path.
    pub fn current_bucket_key(self, now: DateTime<Utc>) -> String {
        self.format_time(now)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Daily => write!(f, "daily"),
            Granularity::Hourly => write!(f, "hourly"),
        }
    }
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Granularity::Daily),
            "hourly" => Ok(Granularity::Hourly),
            other => Err(format!("unknown granularity: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s2_id_round_trip() {
        let pe = PairExchange::new("KRAKEN", Ticker::new("BTC"), Ticker::new("USD"));
        let id = pe.id();
        assert_eq!(id, "KRAKEN_BTC_USD");
        let (exchange, from, to) = parse_id(&id).unwrap();
        assert_eq!(exchange, "KRAKEN");
        assert_eq!(from, Ticker::new("BTC"));
        assert_eq!(to, Ticker::new("USD"));
    }

    #[test]
    fn daily_bucket_key_round_trip() {
        let g = Granularity::Daily;
        let now = Utc::now();
        let key = g.format_time(now);
        let parsed = g.parse_key(&key).unwrap();
        assert_eq!(g.format_time(parsed), key);
    }

    #[test]
    fn hourly_bucket_key_round_trip() {
        let g = Granularity::Hourly;
        let now = Utc::now();
        let key = g.format_time(now);
        let parsed = g.parse_key(&key).unwrap();
        assert_eq!(g.format_time(parsed), key);
    }

    #[test]
    fn granularities_stay_distinguishable() {
        let now = Utc::now();
        let daily_key = Granularity::Daily.format_time(now);
        let hourly_key = Granularity::Hourly.format_time(now);
        assert_ne!(daily_key, hourly_key);
        assert!(hourly_key.starts_with(&daily_key));
    }
}
