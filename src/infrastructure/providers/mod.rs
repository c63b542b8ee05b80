//! Concrete `Provider` adapters (component C implementations) plus the
//! shared HTTP/WebSocket plumbing they build on.

pub mod cmc;
pub mod coinapi;
pub mod common;
pub mod cryptocompare;
pub mod kaiko;
pub mod ws;

use crate::domain::currency::CurrencyRegistry;
use crate::domain::error::ConfigError;
use crate::domain::provider::{Provider, ProviderKind};
use crate::infrastructure::config::AppConfig;
use std::sync::Arc;

/// Builds the `Provider` selected by `config.provider`, validating that
/// the credentials its variant requires were supplied (`AppConfig::from_env`
/// already checked the mandatory ones; this is the wiring point).
pub fn build_provider(
    config: &AppConfig,
    registry: Arc<CurrencyRegistry>,
) -> Result<Arc<dyn Provider>, ConfigError> {
    match config.provider {
        ProviderKind::CoinApi => {
            let key = config
                .coinapi_key
                .clone()
                .ok_or_else(|| ConfigError::new("COINAPI_KEY is required when PROVIDER=coinapi"))?;
            Ok(Arc::new(coinapi::CoinApiProvider::new(key, registry)))
        }
        ProviderKind::CryptoCompare => Ok(Arc::new(cryptocompare::CryptoCompareProvider::new(None, registry))),
        ProviderKind::Kaiko => {
            let key = config
                .kaiko_key
                .clone()
                .ok_or_else(|| ConfigError::new("KAIKO_KEY is required when PROVIDER=kaiko"))?;
            Ok(Arc::new(kaiko::KaikoProvider::new(
                key,
                config.kaiko_key_wss.clone(),
                config.kaiko_region.clone(),
                config.kaiko_api_version.clone(),
                config.use_kaiko_wss,
                registry,
            )))
        }
    }
}

/// The Market-Cap Ranker's source: a dedicated CoinMarketCap adapter when
/// `CMC_API_KEY` is configured, falling back to the rate provider's own
/// (possibly unsupported) `fetch_market_cap_ranking` otherwise.
pub fn build_market_cap_provider(config: &AppConfig, rate_provider: Arc<dyn Provider>) -> Arc<dyn Provider> {
    match &config.cmc_api_key {
        Some(key) => Arc::new(cmc::CoinMarketCapProvider::new(key.clone())),
        None => rate_provider,
    }
}
