//! CryptoCompare adapter. REST polling mirrors the CoinAPI adapter's
//! shape; this provider additionally supports market-cap ranking via
//! its `top/mktcapfull` endpoint.

use crate::domain::currency::{CurrencyRegistry, Ticker};
use crate::domain::error::ProviderError;
use crate::domain::identifier::{Granularity, PairExchange};
use crate::domain::model::{ExchangeRecord, OhlcvrPoint, PriceUpdate};
use crate::domain::provider::{Provider, Subscription, MAX_PAGINATION_PAGES};
use crate::infrastructure::providers::common::{build_client, execute_with_retry};
use crate::infrastructure::providers::ws::WsSubscription;
use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const BASE_URL: &str = "https://min-api.cryptocompare.com/data";
const WS_URL: &str = "wss://streamer.cryptocompare.com/v2";

pub struct CryptoCompareProvider {
    client: Client,
    api_key: Option<String>,
    registry: Arc<CurrencyRegistry>,
}

impl CryptoCompareProvider {
    pub fn new(api_key: Option<String>, registry: Arc<CurrencyRegistry>) -> Self {
        Self {
            client: build_client(Duration::from_secs(30)),
            api_key,
            registry,
        }
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Apikey {key}")),
            None => builder,
        }
    }
}

#[derive(Deserialize)]
struct ExchangeListResponse {
    #[serde(rename = "Data")]
    data: HashMap<String, ExchangePairs>,
}

#[derive(Deserialize)]
struct ExchangePairs {
    pairs: HashMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct ExchangeGeneralResponse {
    #[serde(rename = "Data")]
    data: HashMap<String, ExchangeGeneralEntry>,
}

#[derive(Deserialize)]
struct ExchangeGeneralEntry {
    #[serde(rename = "InternalName")]
    internal_name: String,
    #[serde(rename = "DisplayName")]
    display_name: String,
    #[serde(rename = "Url")]
    url: Option<String>,
}

#[derive(Deserialize)]
struct HistoResponse {
    #[serde(rename = "Data")]
    data: HistoData,
}

#[derive(Deserialize)]
struct HistoData {
    data: Vec<HistoPoint>,
}

#[derive(Deserialize)]
struct HistoPoint {
    time: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volumeto: f64,
}

#[derive(Deserialize)]
struct MarketCapResponse {
    #[serde(rename = "Data")]
    data: Vec<MarketCapEntry>,
}

#[derive(Deserialize)]
struct MarketCapEntry {
    #[serde(rename = "CoinInfo")]
    coin_info: MarketCapCoinInfo,
}

#[derive(Deserialize)]
struct MarketCapCoinInfo {
    #[serde(rename = "Name")]
    name: String,
}

#[async_trait]
impl Provider for CryptoCompareProvider {
    async fn init(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn fetch_available_pair_exchanges(&self) -> Result<Vec<PairExchange>, ProviderError> {
        let url = format!("{BASE_URL}/v2/pair/mapping/exchange?e=all");
        let resp = execute_with_retry(|| self.auth(self.client.get(&url)).send()).await?;
        let parsed: ExchangeListResponse = resp.json().await.map_err(|e| ProviderError::Data(e.to_string()))?;

        let mut out = Vec::new();
        for (exchange, pairs) in parsed.data {
            for (from_symbol, tos) in pairs.pairs {
                let from = Ticker::new(&from_symbol);
                if !self.registry.is_supported(&from) {
                    continue;
                }
                for to_symbol in tos {
                    let to = Ticker::new(&to_symbol);
                    if self.registry.is_supported(&to) {
                        out.push(PairExchange::new(exchange.clone(), from.clone(), to));
                    }
                }
            }
        }
        Ok(out)
    }

    async fn fetch_exchanges(&self) -> Result<Vec<ExchangeRecord>, ProviderError> {
        let url = format!("{BASE_URL}/exchanges/general");
        let resp = execute_with_retry(|| self.auth(self.client.get(&url)).send()).await?;
        let parsed: ExchangeGeneralResponse = resp.json().await.map_err(|e| ProviderError::Data(e.to_string()))?;
        Ok(parsed
            .data
            .into_values()
            .map(|e| ExchangeRecord {
                id: e.internal_name,
                name: e.display_name,
                website: e.url,
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
        let endpoint = match granularity {
            Granularity::Daily => "v2/histoday",
            Granularity::Hourly => "v2/histohour",
        };
        let page_size = limit.unwrap_or(2000).min(2000);
        let mut points = Vec::new();
        let mut to_ts: Option<i64> = None;
        let mut page = 0usize;

        loop {
            if page >= MAX_PAGINATION_PAGES {
                warn!(pair_exchange_id, page, "cryptocompare pagination cap reached");
                break;
            }
            let mut url = format!(
                "{BASE_URL}/{endpoint}?fsym={}&tsym={}&e={}&limit={page_size}",
                from.as_str(),
                to.as_str(),
                exchange
            );
            if let Some(ts) = to_ts {
                url.push_str(&format!("&toTs={ts}"));
            }
            let resp = execute_with_retry(|| self.auth(self.client.get(&url)).send()).await?;
            let parsed: HistoResponse = resp.json().await.map_err(|e| ProviderError::Data(e.to_string()))?;
            if parsed.data.data.is_empty() {
                break;
            }
            let earliest = parsed.data.data.first().map(|p| p.time);
            points.extend(parsed.data.data.into_iter().map(|p| OhlcvrPoint {
                time: chrono::DateTime::from_timestamp(p.time, 0).unwrap_or_else(chrono::Utc::now),
                open: p.open,
                high: p.high,
                low: p.low,
                close: p.close,
                volume: p.volumeto,
            }));

            if let Some(limit) = limit {
                if points.len() >= limit {
                    points.truncate(limit);
                    break;
                }
            }
            match earliest {
                Some(ts) if ts > 0 => to_ts = Some(ts - 1),
                _ => break,
            }
            page += 1;
        }

        Ok(points)
    }

    async fn subscribe_price_update(
        &self,
    ) -> Result<(BoxStream<'static, PriceUpdate>, Box<dyn Subscription>), ProviderError> {
        let url = match &self.api_key {
            Some(key) => format!("{WS_URL}?api_key={key}"),
            None => WS_URL.to_string(),
        };
        WsSubscription::connect(&url, None).await
    }

    async fn fetch_market_cap_ranking(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{BASE_URL}/top/mktcapfull?limit=200&tsym=USD");
        let resp = execute_with_retry(|| self.auth(self.client.get(&url)).send()).await?;
        let parsed: MarketCapResponse = resp.json().await.map_err(|e| ProviderError::Data(e.to_string()))?;
        Ok(parsed.data.into_iter().map(|e| e.coin_info.name).collect())
    }
}
