//! CoinMarketCap adapter. Used exclusively as the Market-Cap Ranker's
//! source (`CMC_API_KEY`, §6) -- it never backs the rate-provider slot,
//! so every method outside `fetch_market_cap_ranking` is out of scope
//! and fails fast rather than pretending to serve rate data.

use crate::domain::error::ProviderError;
use crate::domain::identifier::{Granularity, PairExchange};
use crate::domain::model::{ExchangeRecord, OhlcvrPoint, PriceUpdate};
use crate::domain::provider::{Provider, Subscription};
use crate::infrastructure::providers::common::{build_client, execute_with_retry};
use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const BASE_URL: &str = "https://pro-api.coinmarketcap.com/v1";

pub struct CoinMarketCapProvider {
    client: Client,
    api_key: String,
}

impl CoinMarketCapProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: build_client(Duration::from_secs(30)),
            api_key,
        }
    }

    fn unsupported(op: &str) -> ProviderError {
        ProviderError::Transient(format!("CoinMarketCap adapter does not support {op}"))
    }
}

#[derive(Deserialize)]
struct ListingsResponse {
    data: Vec<ListingEntry>,
}

#[derive(Deserialize)]
struct ListingEntry {
    symbol: String,
}

#[async_trait]
impl Provider for CoinMarketCapProvider {
    async fn init(&self) -> Result<(), ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(crate::domain::error::ConfigError::new("CMC_API_KEY must not be empty").into());
        }
        Ok(())
    }

    async fn fetch_available_pair_exchanges(&self) -> Result<Vec<PairExchange>, ProviderError> {
        Err(Self::unsupported("pair-exchange enumeration"))
    }

    async fn fetch_exchanges(&self) -> Result<Vec<ExchangeRecord>, ProviderError> {
        Err(Self::unsupported("exchange listing"))
    }

    async fn fetch_histo_series(
        &self,
        _pair_exchange_id: &str,
        _granularity: Granularity,
        _limit: Option<usize>,
    ) -> Result<Vec<OhlcvrPoint>, ProviderError> {
        Err(Self::unsupported("historical series"))
    }

    async fn subscribe_price_update(
        &self,
    ) -> Result<(BoxStream<'static, PriceUpdate>, Box<dyn Subscription>), ProviderError> {
        Err(Self::unsupported("live price streaming"))
    }

    async fn fetch_market_cap_ranking(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{BASE_URL}/cryptocurrency/listings/latest?limit=200&sort=market_cap");
        let resp = execute_with_retry(|| {
            self.client
                .get(&url)
                .header("X-CMC_PRO_API_KEY", &self.api_key)
                .send()
        })
        .await?;
        let parsed: ListingsResponse = resp.json().await.map_err(|e| ProviderError::Data(e.to_string()))?;
        Ok(parsed.data.into_iter().map(|e| e.symbol).collect())
    }
}
