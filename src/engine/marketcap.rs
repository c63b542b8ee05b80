//! Market-Cap Ranker (component J): daily cached ranking of crypto
//! tickers by external market-cap source.

use crate::domain::currency::CurrencyRegistry;
use crate::domain::error::EngineError;
use crate::domain::provider::Provider;
use crate::domain::store::Store;
use crate::engine::throttle::{Throttle, ThrottleResult};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Outer throttle window (§4.F's table entry). The real daily gate is
/// the "does today's snapshot already exist" check inside `refresh`.
pub const MARKET_CAP_THROTTLE_WINDOW: Duration = Duration::from_secs(60);

pub struct MarketCapRanker {
    provider: Arc<dyn Provider>,
    store: Arc<dyn Store>,
    registry: Arc<CurrencyRegistry>,
    throttle: Throttle<Vec<String>>,
}

impl MarketCapRanker {
    pub fn new(provider: Arc<dyn Provider>, store: Arc<dyn Store>, registry: Arc<CurrencyRegistry>) -> Self {
        Self {
            provider,
            store,
            registry,
            throttle: Throttle::new(MARKET_CAP_THROTTLE_WINDOW),
        }
    }

    /// On each call, load today's snapshot; if present, return it; else
    /// fetch from the market-cap source, filter to known crypto tickers
    /// preserving rank order, store with today's day key.
    pub async fn refresh(&self) -> ThrottleResult<Vec<String>> {
        let provider = self.provider.clone();
        let store = self.store.clone();
        let registry = self.registry.clone();

        self.throttle
            .call(move || async move {
                let today = Utc::now().format("%Y-%m-%d").to_string();

                if let Some(snapshot) = store
                    .query_market_cap_coins_for_day(&today)
                    .await
                    .map_err(EngineError::from)?
                {
                    return Ok(snapshot.coins);
                }

                let ranking = provider
                    .fetch_market_cap_ranking()
                    .await
                    .map_err(EngineError::from)?;
                let filtered: Vec<String> = ranking
                    .into_iter()
                    .filter(|sym| registry.is_crypto(&crate::domain::currency::Ticker::new(sym)))
                    .collect();

                store
                    .update_market_cap_coins(&today, filtered.clone())
                    .await
                    .map_err(EngineError::from)?;

                Ok(filtered)
            })
            .await
    }
}
