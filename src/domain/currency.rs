//! Currency Registry (component A).
//!
//! A fixed, immutable table of known tickers and their decimal magnitude
//! -- the exponent mapping a "raw unit" to its smallest indivisible unit
//! (satoshi, cent, wei-scaled-to-practical-precision, ...). Callers MUST
//! pre-filter with `is_supported` before calling `magnitude` or
//! `to_cent_sat_rate`; both fail fast with `UnknownTicker` otherwise.

use crate::domain::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A short textual ticker symbol, e.g. `BTC`, `USD`, `ETH`. Always stored
/// and compared upper-case; construction normalises the case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticker(String);

impl Ticker {
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Self(symbol.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Ticker {
    fn from(s: &str) -> Self {
        Ticker::new(s)
    }
}

impl From<String> for Ticker {
    fn from(s: String) -> Self {
        Ticker::new(s)
    }
}

/// Immutable table of ticker -> magnitude, built once at process start.
#[derive(Debug, Clone)]
pub struct CurrencyRegistry {
    magnitudes: HashMap<Ticker, u32>,
    /// Subset considered "crypto" for market-cap filtering (component J)
    /// and prefetch ordering -- fiat currencies are supported for
    /// conversions but never ranked by market cap.
    crypto: std::collections::HashSet<Ticker>,
}

impl CurrencyRegistry {
    /// The seed table: enough crypto coins, fiat currencies and stable
    /// tokens to exercise every cross-unit conversion the service
    /// supports.
    pub fn with_defaults() -> Self {
        let crypto: &[(&str, u32)] = &[
            ("BTC", 8),
            ("ETH", 8),
            ("LTC", 8),
            ("XRP", 6),
            ("BCH", 8),
            ("DOGE", 8),
            ("USDT", 6),
            ("USDC", 6),
            ("SOL", 9),
            ("ADA", 6),
            ("DOT", 10),
            ("KAS", 8),
        ];
        let fiat: &[(&str, u32)] = &[
            ("USD", 2),
            ("EUR", 2),
            ("GBP", 2),
            ("JPY", 0),
            ("CHF", 2),
            ("CNY", 2),
        ];

        let mut magnitudes = HashMap::new();
        let mut crypto_set = std::collections::HashSet::new();
        for (sym, mag) in crypto {
            let t = Ticker::new(sym);
            magnitudes.insert(t.clone(), *mag);
            crypto_set.insert(t);
        }
        for (sym, mag) in fiat {
            magnitudes.insert(Ticker::new(sym), *mag);
        }

        Self {
            magnitudes,
            crypto: crypto_set,
        }
    }

    pub fn is_supported(&self, ticker: &Ticker) -> bool {
        self.magnitudes.contains_key(ticker)
    }

    pub fn is_crypto(&self, ticker: &Ticker) -> bool {
        self.crypto.contains(ticker)
    }

    pub fn magnitude(&self, ticker: &Ticker) -> Result<u32, EngineError> {
        self.magnitudes
            .get(ticker)
            .copied()
            .ok_or_else(|| EngineError::UnknownTicker(ticker.to_string()))
    }

    /// `raw * 10^(mag(to) - mag(from))` -- the rate expressed in the
    /// destination's smallest unit per source's smallest unit.
    pub fn to_cent_sat_rate(&self, from: &Ticker, to: &Ticker, raw: f64) -> Result<f64, EngineError> {
        let mag_from = self.magnitude(from)? as i32;
        let mag_to = self.magnitude(to)? as i32;
        Ok(raw * 10f64.powi(mag_to - mag_from))
    }
}

impl Default for CurrencyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_normalisation_btc_usd() {
        let reg = CurrencyRegistry::with_defaults();
        let btc = Ticker::new("btc");
        let usd = Ticker::new("usd");
        let rate = reg.to_cent_sat_rate(&btc, &usd, 23456.78).unwrap();
        assert!((rate - 0.02345678).abs() < 1e-12);
    }

    #[test]
    fn unknown_ticker_fails_fast() {
        let reg = CurrencyRegistry::with_defaults();
        let unknown = Ticker::new("ZZZNOPE");
        assert!(!reg.is_supported(&unknown));
        assert!(matches!(
            reg.magnitude(&unknown),
            Err(EngineError::UnknownTicker(_))
        ));
    }

    #[test]
    fn ticker_case_insensitive_construction() {
        assert_eq!(Ticker::new("btc"), Ticker::new("BTC"));
    }
}
