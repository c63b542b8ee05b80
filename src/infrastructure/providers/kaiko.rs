//! Kaiko adapter. Unlike the other two, Kaiko's REST surface is
//! region/version-parameterised and its streaming credential is
//! separate from the REST key (`KAIKO_KEY_WSS`); `USE_KAIKO_WSS` gates
//! whether `subscribe_price_update` is even attempted.

use crate::domain::currency::{CurrencyRegistry, Ticker};
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

pub struct KaikoProvider {
    client: Client,
    api_key: String,
    key_wss: Option<String>,
    region: String,
    api_version: String,
    use_wss: bool,
    registry: Arc<CurrencyRegistry>,
}

impl KaikoProvider {
    pub fn new(
        api_key: String,
        key_wss: Option<String>,
        region: String,
        api_version: String,
        use_wss: bool,
        registry: Arc<CurrencyRegistry>,
    ) -> Self {
        Self {
            client: build_client(Duration::from_secs(30)),
            api_key,
            key_wss,
            region,
            api_version,
            use_wss,
            registry,
        }
    }

    fn rest_base(&self) -> String {
        format!("https://{}.market-api.kaiko.io/{}", self.region, self.api_version)
    }
}

#[derive(Deserialize)]
struct InstrumentsResponse {
    data: Vec<Instrument>,
}

#[derive(Deserialize)]
struct Instrument {
    code: String,
    exchange_code: String,
    base_asset: String,
    quote_asset: String,
}

#[derive(Deserialize)]
struct ExchangesResponse {
    data: Vec<ExchangeEntry>,
}

#[derive(Deserialize)]
struct ExchangeEntry {
    code: String,
    name: String,
}

#[derive(Deserialize)]
struct OhlcvResponse {
    data: Vec<OhlcvEntry>,
}

#[derive(Deserialize)]
struct OhlcvEntry {
    timestamp: i64,
    open: String,
    high: String,
    low: String,
    close: String,
    volume: String,
}

#[async_trait]
impl Provider for KaikoProvider {
    async fn init(&self) -> Result<(), ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::new("KAIKO_KEY must not be empty").into());
        }
        if self.use_wss && self.key_wss.is_none() {
            return Err(ConfigError::new("KAIKO_KEY_WSS is required when USE_KAIKO_WSS is set").into());
        }
        Ok(())
    }

    async fn fetch_available_pair_exchanges(&self) -> Result<Vec<PairExchange>, ProviderError> {
        let url = format!("{}/instruments", self.rest_base());
        let resp = execute_with_retry(|| self.client.get(&url).header("X-Api-Key", &self.api_key).send()).await?;
        let parsed: InstrumentsResponse = resp.json().await.map_err(|e| ProviderError::Data(e.to_string()))?;
        Ok(parsed
            .data
            .into_iter()
            .filter_map(|i| {
                let from = Ticker::new(&i.base_asset);
                let to = Ticker::new(&i.quote_asset);
                if self.registry.is_supported(&from) && self.registry.is_supported(&to) {
                    Some(PairExchange::new(i.exchange_code, from, to))
                } else {
                    let _ = i.code;
                    None
                }
            })
            .collect())
    }

    async fn fetch_exchanges(&self) -> Result<Vec<ExchangeRecord>, ProviderError> {
        let url = format!("{}/exchanges", self.rest_base());
        let resp = execute_with_retry(|| self.client.get(&url).header("X-Api-Key", &self.api_key).send()).await?;
        let parsed: ExchangesResponse = resp.json().await.map_err(|e| ProviderError::Data(e.to_string()))?;
        Ok(parsed
            .data
            .into_iter()
            .map(|e| ExchangeRecord {
                id: e.code,
                name: e.name,
                website: None,
            })
            .collect())
    }

    async fn fetch_histo_series(
        &self,
        pair_exchange_id: &str,
        granularity: Granularity,
        limit: Option<usize>,
    ) -> Result<Vec<OhlcvrPoint>, ProviderError> {
        let (exchange, from, to) = crate::domain::identifier::parse_id(pair_exchange_id)
            .ok_or_else(|| ProviderError::Data(format!("malformed pair-exchange id: {pair_exchange_id}")))?;
        let interval = match granularity {
            Granularity::Daily => "1d",
            Granularity::Hourly => "1h",
        };
        let page_size = 1000usize;
        let mut points = Vec::new();
        let mut continuation: Option<String> = None;
        let mut page = 0usize;

        loop {
            if page >= MAX_PAGINATION_PAGES {
                warn!(pair_exchange_id, page, "kaiko pagination cap reached");
                break;
            }
            let mut url = format!(
                "{}/data/trades.v1/exchanges/{exchange}/spot/{}-{}/aggregations/ohlcv?interval={interval}&page_size={page_size}",
                self.rest_base(),
                from.as_str().to_ascii_lowercase(),
                to.as_str().to_ascii_lowercase(),
            );
            if let Some(cont) = &continuation {
                url.push_str(&format!("&continuation_token={cont}"));
            }
            let resp = execute_with_retry(|| self.client.get(&url).header("X-Api-Key", &self.api_key).send()).await?;
            let parsed: OhlcvResponse = resp.json().await.map_err(|e| ProviderError::Data(e.to_string()))?;
            let batch_len = parsed.data.len();
            for point in parsed.data {
                let parse = |s: &str| s.parse::<f64>().map_err(|e| ProviderError::Data(e.to_string()));
                points.push(OhlcvrPoint {
                    time: chrono::DateTime::from_timestamp_millis(point.timestamp).unwrap_or_else(chrono::Utc::now),
                    open: parse(&point.open)?,
                    high: parse(&point.high)?,
                    low: parse(&point.low)?,
                    close: parse(&point.close)?,
                    volume: parse(&point.volume)?,
                });
            }

            if batch_len < page_size {
                break;
            }
            if let Some(limit) = limit {
                if points.len() >= limit {
                    points.truncate(limit);
                    break;
                }
            }
            continuation = Some(format!("page-{page}"));
            page += 1;
        }

        Ok(points)
    }

    async fn subscribe_price_update(
        &self,
    ) -> Result<(BoxStream<'static, PriceUpdate>, Box<dyn Subscription>), ProviderError> {
        if !self.use_wss {
            return Err(ProviderError::Transient(
                "USE_KAIKO_WSS is not set; streaming disabled for this deployment".into(),
            ));
        }
        let key = self
            .key_wss
            .clone()
            .ok_or_else(|| ConfigError::new("KAIKO_KEY_WSS is required for streaming"))?;
        let url = format!("wss://{}.market-ws.kaiko.io/v2/data/trades.v1", self.region);
        WsSubscription::connect(&url, Some(key)).await
    }
}
