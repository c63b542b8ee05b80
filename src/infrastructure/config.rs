//! Environment-driven configuration (§6). Parsing only -- selection of
//! the concrete provider/store adapter happens at the call site so
//! `ConfigError` can be raised with adapter-specific context.

use crate::domain::error::ConfigError;
use crate::domain::provider::ProviderKind;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderKind,
    pub database: DatabaseKind,
    pub mongodb_uri: String,
    pub coinapi_key: Option<String>,
    pub kaiko_key: Option<String>,
    pub kaiko_key_wss: Option<String>,
    pub cmc_api_key: Option<String>,
    pub kaiko_region: String,
    pub kaiko_api_version: String,
    pub use_kaiko_wss: bool,
    pub blacklist_exchanges: Vec<String>,
    pub minimal_days_to_consider_exchange: Option<u32>,
    pub disable_prefetch: bool,
    pub hack_sync_in_server: bool,
    pub debug_live_rates: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    MongoDb,
}

impl FromStr for DatabaseKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mongodb" => Ok(DatabaseKind::MongoDb),
            other => Err(ConfigError::new(format!("unknown DATABASE: {other}"))),
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider_raw =
            std::env::var("PROVIDER").map_err(|_| ConfigError::new("PROVIDER is required"))?;
        let provider = ProviderKind::from_str(&provider_raw).map_err(|e| ConfigError::new(e.0))?;

        let database_raw = std::env::var("DATABASE").unwrap_or_else(|_| "mongodb".to_string());
        let database = DatabaseKind::from_str(&database_raw)?;

        let coinapi_key = std::env::var("COINAPI_KEY").ok();
        let kaiko_key = std::env::var("KAIKO_KEY").ok();
        let kaiko_key_wss = std::env::var("KAIKO_KEY_WSS").ok();
        let cmc_api_key = std::env::var("CMC_API_KEY").ok();

        match provider {
            ProviderKind::CoinApi if coinapi_key.is_none() => {
                return Err(ConfigError::new("COINAPI_KEY is required when PROVIDER=coinapi"));
            }
            ProviderKind::Kaiko if kaiko_key.is_none() => {
                return Err(ConfigError::new("KAIKO_KEY is required when PROVIDER=kaiko"));
            }
            _ => {}
        }

        let mongodb_uri = std::env::var("MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017/ledger-countervalue".to_string());

        let blacklist_exchanges = std::env::var("BLACKLIST_EXCHANGES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        let minimal_days_to_consider_exchange = std::env::var("MINIMAL_DAYS_TO_CONSIDER_EXCHANGE")
            .ok()
            .and_then(|v| v.parse::<u32>().ok());

        let port = std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8088);

        Ok(Self {
            provider,
            database,
            mongodb_uri,
            coinapi_key,
            kaiko_key,
            kaiko_key_wss,
            cmc_api_key,
            kaiko_region: std::env::var("KAIKO_REGION").unwrap_or_else(|_| "eu".to_string()),
            kaiko_api_version: std::env::var("KAIKO_API_VERSION").unwrap_or_else(|_| "v1".to_string()),
            use_kaiko_wss: std::env::var("USE_KAIKO_WSS").map(|v| is_truthy(&v)).unwrap_or(false),
            blacklist_exchanges,
            minimal_days_to_consider_exchange,
            disable_prefetch: std::env::var("DISABLE_PREFETCH").map(|v| is_truthy(&v)).unwrap_or(false),
            hack_sync_in_server: std::env::var("HACK_SYNC_IN_SERVER").map(|v| is_truthy(&v)).unwrap_or(false),
            debug_live_rates: std::env::var("DEBUG_LIVE_RATES").map(|v| is_truthy(&v)).unwrap_or(false),
            port,
        })
    }

    pub fn min_days(&self) -> u32 {
        crate::engine::stats::min_days(self.minimal_days_to_consider_exchange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy("true"));
        assert!(is_truthy("TRUE"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
    }
}
