//! Read Service (component K): the pure-read query facade consumed by
//! the HTTP layer.

use crate::domain::error::EngineError;
use crate::domain::identifier::Granularity;
use crate::domain::model::{ExchangeRecord, PairExchangeRecord, Rate};
use crate::domain::store::Store;
use crate::engine::marketcap::MarketCapRanker;
use crate::engine::refresh::RefreshEngine;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::warn;

/// One requested `(from, to[, exchange][, after|at])` line of a `getHisto` call.
#[derive(Debug, Clone)]
pub struct RequestPair {
    pub from: String,
    pub to: String,
    pub exchange: Option<String>,
    pub after: Option<DateTime<Utc>>,
    pub at: Option<Vec<String>>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PairData {
    #[serde(flatten)]
    pub rates: BTreeMap<String, Rate>,
    pub latest: Rate,
}

/// `to -> from -> exchange -> PairData`
pub type HistoResponse = BTreeMap<String, BTreeMap<String, BTreeMap<String, PairData>>>;

pub struct ReadService {
    refresh: Arc<RefreshEngine>,
    store: Arc<dyn Store>,
    marketcap: Arc<MarketCapRanker>,
    /// Lower-cased for case-insensitive comparison (§3, `BLACKLIST_EXCHANGES`).
    blacklist: HashSet<String>,
}

impl ReadService {
    pub fn new(
        refresh: Arc<RefreshEngine>,
        store: Arc<dyn Store>,
        marketcap: Arc<MarketCapRanker>,
        blacklist_exchanges: &[String],
    ) -> Self {
        Self {
            refresh,
            store,
            marketcap,
            blacklist: blacklist_exchanges.iter().map(|s| s.to_ascii_lowercase()).collect(),
        }
    }

    fn is_blacklisted(&self, exchange: &str) -> bool {
        self.blacklist.contains(&exchange.to_ascii_lowercase())
    }

    async fn candidates_for_pair(&self, from: &str, to: &str) -> Result<Vec<PairExchangeRecord>, EngineError> {
        let mut records = self
            .store
            .query_pair_exchanges_by_pair(&[(from.to_string(), to.to_string())])
            .await?;
        records.retain(|r| !self.is_blacklisted(&r.exchange));
        records.sort_by(|a, b| {
            b.has_history_for_1_year
                .cmp(&a.has_history_for_1_year)
                .then(
                    b.yesterday_volume
                        .partial_cmp(&a.yesterday_volume)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });
        Ok(records)
    }

    fn pick_candidate<'a>(
        records: &'a [PairExchangeRecord],
        exchange: Option<&str>,
    ) -> Option<&'a PairExchangeRecord> {
        if let Some(exchange) = exchange {
            return records
                .iter()
                .find(|r| r.exchange.eq_ignore_ascii_case(exchange) && r.has_history_for_30_last_days);
        }
        records.iter().find(|r| r.has_history_for_30_last_days)
    }

    /// `getHisto(requestPairs, granularity)`.
    pub async fn get_histo(
        &self,
        request_pairs: &[RequestPair],
        granularity: Granularity,
    ) -> Result<HistoResponse, EngineError> {
        if let Err(e) = self.refresh.refresh_available_pair_exchanges().await {
            warn!(error = %e, "getHisto: available pair-exchanges refresh failed, serving persisted view");
        }

        let mut response: HistoResponse = BTreeMap::new();

        for req in request_pairs {
            let candidates = match self.candidates_for_pair(&req.from, &req.to).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(from = %req.from, to = %req.to, error = %e, "getHisto: candidate lookup failed");
                    continue;
                }
            };
            let Some(chosen) = Self::pick_candidate(&candidates, req.exchange.as_deref()) else {
                continue;
            };

            let histo = match self.refresh.refresh_histo(&chosen.id, granularity).await {
                Ok(h) => h,
                Err(_) => chosen.histo(granularity).clone(),
            };

            let filtered = if let Some(at) = &req.at {
                histo.retain_keys(at)
            } else {
                histo.retain_after(granularity, req.after)
            };

            let mut rates: BTreeMap<String, Rate> = filtered
                .0
                .iter()
                .filter(|(k, _)| k.as_str() != crate::domain::model::LATEST_KEY)
                .map(|(k, v)| (k.clone(), *v))
                .collect();
            if let Some(at) = &req.at {
                // `at` may request the reserved key explicitly.
                if at.iter().any(|k| k == crate::domain::model::LATEST_KEY) {
                    if let Some(latest) = filtered.latest() {
                        rates.insert(crate::domain::model::LATEST_KEY.to_string(), latest);
                    }
                }
            }

            let data = PairData {
                rates,
                latest: chosen.latest,
            };

            response
                .entry(req.to.clone())
                .or_default()
                .entry(req.from.clone())
                .or_default()
                .insert(chosen.exchange.clone(), data);
        }

        Ok(response)
    }

    /// `getExchanges({pair})`.
    pub async fn get_exchanges(&self, from: &str, to: &str) -> Result<Vec<ExchangeRecord>, EngineError> {
        let known = match self.refresh.refresh_exchanges().await {
            Ok(list) => list,
            Err(_) => self.store.query_exchanges().await?,
        };
        let known_by_id: std::collections::HashMap<String, ExchangeRecord> =
            known.into_iter().map(|e| (e.id.clone(), e)).collect();

        let candidates = self.candidates_for_pair(from, to).await?;
        let candidates: Vec<_> = candidates
            .into_iter()
            .filter(|r| r.has_history_for_30_last_days)
            .collect();

        Ok(candidates
            .into_iter()
            .map(|r| {
                known_by_id.get(&r.exchange).cloned().unwrap_or(ExchangeRecord {
                    id: r.exchange.clone(),
                    name: r.exchange.clone(),
                    website: None,
                })
            })
            .collect())
    }

    /// `getDailyMarketCapCoins()` -- passthrough to component J.
    pub async fn get_daily_market_cap_coins(&self) -> Result<Vec<String>, EngineError> {
        self.marketcap.refresh().await.map_err(|e| {
            // `Arc<EngineError>` doesn't implement `Clone`'s inverse into an
            // owned `EngineError` cheaply without a custom Clone; re-wrap
            // the message instead of exposing the Arc to callers.
            EngineError::Store(crate::domain::error::StoreError::new(e.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::PairExchangeRecord;

    fn record(exchange: &str, has_1y: bool, vol: f64, has_30d: bool) -> PairExchangeRecord {
        let mut r = PairExchangeRecord::new_default(exchange, "BTC", "USD");
        r.has_history_for_1_year = has_1y;
        r.yesterday_volume = vol;
        r.has_history_for_30_last_days = has_30d;
        r
    }

    #[test]
    fn s5_candidate_selection_prefers_1y_history_over_volume() {
        let x = record("X", true, 10.0, true);
        let y = record("Y", false, 1000.0, true);
        let records = vec![y, x.clone()];
        let mut sorted = records;
        sorted.sort_by(|a, b| {
            b.has_history_for_1_year
                .cmp(&a.has_history_for_1_year)
                .then(b.yesterday_volume.partial_cmp(&a.yesterday_volume).unwrap())
        });
        let chosen = ReadService::pick_candidate(&sorted, None).unwrap();
        assert_eq!(chosen.exchange, "X");
    }

    #[test]
    fn boundary_no_30_day_candidate_yields_no_selection() {
        let only = record("Z", true, 5.0, false);
        let records = vec![only];
        assert!(ReadService::pick_candidate(&records, None).is_none());
    }

    #[test]
    fn explicit_exchange_request_is_honoured() {
        let a = record("A", true, 100.0, true);
        let b = record("B", false, 1.0, true);
        let records = vec![a, b];
        let chosen = ReadService::pick_candidate(&records, Some("b")).unwrap();
        assert_eq!(chosen.exchange, "B");
    }

    #[test]
    fn explicit_exchange_without_30_day_history_yields_no_selection() {
        let a = record("A", true, 100.0, true);
        let b = record("B", false, 1.0, false);
        let records = vec![a, b];
        assert!(ReadService::pick_candidate(&records, Some("b")).is_none());
    }
}
