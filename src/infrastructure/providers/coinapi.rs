//! CoinAPI adapter: REST polling for pairs/exchanges/histo, cold
//! WebSocket subscription for live price updates.

use crate::domain::currency::CurrencyRegistry;
use crate::domain::error::{ConfigError, ProviderError};
use crate::domain::identifier::{Granularity, PairExchange};
use crate::domain::model::{ExchangeRecord, OhlcvrPoint, PriceUpdate};
use crate::domain::provider::{Provider, Subscription, MAX_PAGINATION_PAGES};
use crate::infrastructure::providers::common::{build_client, execute_with_retry};
use crate::infrastructure::providers::ws::WsSubscription;
use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const BASE_URL: &str = "https://rest.coinapi.io/v1";
const WS_URL: &str = "wss://ws.coinapi.io/v1/";

pub struct CoinApiProvider {
    client: Client,
    api_key: String,
    registry: Arc<CurrencyRegistry>,
}

impl CoinApiProvider {
    pub fn new(api_key: String, registry: Arc<CurrencyRegistry>) -> Self {
        Self {
            client: build_client(Duration::from_secs(30)),
            api_key,
            registry,
        }
    }
}

#[derive(Deserialize)]
struct CoinApiSymbol {
    symbol_id: String,
    asset_id_base: String,
    asset_id_quote: String,
}

#[derive(Deserialize)]
struct CoinApiExchange {
    exchange_id: String,
    name: String,
    website: Option<String>,
}

#[derive(Deserialize)]
struct CoinApiOhlcv {
    time_period_start: chrono::DateTime<chrono::Utc>,
    price_open: f64,
    price_high: f64,
    price_low: f64,
    price_close: f64,
    volume_traded: f64,
}

#[async_trait]
impl Provider for CoinApiProvider {
    async fn init(&self) -> Result<(), ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::new("COINAPI_KEY must not be empty").into());
        }
        Ok(())
    }

    async fn fetch_available_pair_exchanges(&self) -> Result<Vec<PairExchange>, ProviderError> {
        let url = format!("{BASE_URL}/symbols");
        let resp = execute_with_retry(|| {
            self.client
                .get(&url)
                .header("X-CoinAPI-Key", &self.api_key)
                .send()
        })
        .await?;

        let symbols: Vec<CoinApiSymbol> = resp
            .json()
            .await
            .map_err(|e| ProviderError::Data(e.to_string()))?;

        Ok(symbols
            .into_iter()
            .filter_map(|s| {
                let from = crate::domain::currency::Ticker::new(&s.asset_id_base);
                let to = crate::domain::currency::Ticker::new(&s.asset_id_quote);
                if self.registry.is_supported(&from) && self.registry.is_supported(&to) {
                    let exchange = s.symbol_id.split('_').next().unwrap_or(&s.symbol_id);
                    Some(PairExchange::new(exchange, from, to))
                } else {
                    None
                }
            })
            .collect())
    }

    async fn fetch_exchanges(&self) -> Result<Vec<ExchangeRecord>, ProviderError> {
        let url = format!("{BASE_URL}/exchanges");
        let resp = execute_with_retry(|| self.client.get(&url).header("X-CoinAPI-Key", &self.api_key).send()).await?;
        let exchanges: Vec<CoinApiExchange> = resp.json().await.map_err(|e| ProviderError::Data(e.to_string()))?;
        Ok(exchanges
            .into_iter()
            .map(|e| ExchangeRecord {
                id: e.exchange_id,
                name: e.name,
                website: e.website,
            })
            .collect())
    }

    async fn fetch_histo_series(
        &self,
        pair_exchange_id: &str,
        granularity: Granularity,
        limit: Option<usize>,
    ) -> Result<Vec<OhlcvrPoint>, ProviderError> {
        let period = match granularity {
            Granularity::Daily => "1DAY",
            Granularity::Hourly => "1HRS",
        };
        let mut points = Vec::new();
        let page_size = 100usize;
        let mut page = 0usize;

        loop {
            if page >= MAX_PAGINATION_PAGES {
                warn!(pair_exchange_id, page, "coinapi pagination cap reached");
                break;
            }
            let url = format!(
                "{BASE_URL}/ohlcv/{pair_exchange_id}/history?period_id={period}&limit={page_size}&offset={}",
                page * page_size
            );
            let resp = execute_with_retry(|| self.client.get(&url).header("X-CoinAPI-Key", &self.api_key).send()).await?;
            let batch: Vec<CoinApiOhlcv> = resp.json().await.map_err(|e| ProviderError::Data(e.to_string()))?;
            let batch_len = batch.len();
            points.extend(batch.into_iter().map(|p| OhlcvrPoint {
                time: p.time_period_start,
                open: p.price_open,
                high: p.price_high,
                low: p.price_low,
                close: p.price_close,
                volume: p.volume_traded,
            }));

            if batch_len < page_size {
                break;
            }
            if let Some(limit) = limit {
                if points.len() >= limit {
                    points.truncate(limit);
                    break;
                }
            }
            page += 1;
        }

        Ok(points)
    }

    async fn subscribe_price_update(
        &self,
    ) -> Result<(BoxStream<'static, PriceUpdate>, Box<dyn Subscription>), ProviderError> {
        WsSubscription::connect(WS_URL, Some(self.api_key.clone())).await
    }
}
