//! Refresh Engine (component F): orchestrates throttled fetches of
//! available pairs, exchanges, and historical series.

use crate::domain::currency::CurrencyRegistry;
use crate::domain::error::{EngineError, ProviderError};
use crate::domain::identifier::Granularity;
use crate::domain::model::{ExchangeRecord, Histo, OhlcvrPoint, PairExchangeRecord, PairExchangeStats};
use crate::domain::provider::Provider;
use crate::domain::store::Store;
use crate::engine::stats;
use crate::engine::throttle::{Throttle, ThrottleResult};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

pub const PAIR_EXCHANGES_WINDOW: Duration = Duration::from_secs(3600);
pub const EXCHANGES_WINDOW: Duration = Duration::from_secs(3600);
pub const HISTO_WINDOW: Duration = Duration::from_secs(15 * 60);

pub struct RefreshEngine {
    provider: Arc<dyn Provider>,
    store: Arc<dyn Store>,
    registry: Arc<CurrencyRegistry>,
    min_days: u32,
    pair_exchanges_throttle: Throttle<Vec<crate::domain::identifier::PairExchange>>,
    exchanges_throttle: Throttle<Vec<ExchangeRecord>>,
    histo_throttles: AsyncMutex<HashMap<(String, GranularityKey), Arc<Throttle<Histo>>>>,
}

/// `Granularity` isn't `Hash`/`Eq` today because bucket arithmetic never
/// needs it; the refresh engine's per-`(id, granularity)` throttle map
/// does, so it keys on this local newtype instead of widening the
/// public enum's derives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GranularityKey {
    Daily,
    Hourly,
}

impl From<Granularity> for GranularityKey {
    fn from(g: Granularity) -> Self {
        match g {
            Granularity::Daily => GranularityKey::Daily,
            Granularity::Hourly => GranularityKey::Hourly,
        }
    }
}

impl RefreshEngine {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<dyn Store>,
        registry: Arc<CurrencyRegistry>,
        min_days: u32,
    ) -> Self {
        Self {
            provider,
            store,
            registry,
            min_days,
            pair_exchanges_throttle: Throttle::new(PAIR_EXCHANGES_WINDOW),
            exchanges_throttle: Throttle::new(EXCHANGES_WINDOW),
            histo_throttles: AsyncMutex::new(HashMap::new()),
        }
    }

    /// Fetch via provider; map each into a fresh default record
    /// (optimistically `hasHistoryFor30LastDays = true`); insert-if-absent.
    pub async fn refresh_available_pair_exchanges(&self) -> ThrottleResult<usize> {
        let provider = self.provider.clone();
        let store = self.store.clone();
        let result = self
            .pair_exchanges_throttle
            .call(move || async move { provider.fetch_available_pair_exchanges().await.map_err(EngineError::from) })
            .await?;

        let records: Vec<PairExchangeRecord> = result
            .iter()
            .map(|pe| PairExchangeRecord::new_default(&pe.exchange, pe.from.as_str(), pe.to.as_str()))
            .collect();
        let count = records.len();
        store
            .insert_pair_exchange_data(records)
            .await
            .map_err(|e| Arc::new(EngineError::from(e)))?;
        Ok(count)
    }

    pub async fn refresh_exchanges(&self) -> ThrottleResult<Vec<ExchangeRecord>> {
        let provider = self.provider.clone();
        let store = self.store.clone();
        let result = self
            .exchanges_throttle
            .call(move || async move {
                let exchanges = provider.fetch_exchanges().await.map_err(EngineError::from)?;
                store
                    .update_exchanges(exchanges.clone())
                    .await
                    .map_err(EngineError::from)?;
                Ok(exchanges)
            })
            .await?;
        Ok(result)
    }

    async fn histo_throttle(&self, id: &str, g: Granularity) -> Arc<Throttle<Histo>> {
        let key = (id.to_string(), GranularityKey::from(g));
        let mut map = self.histo_throttles.lock().await;
        map.entry(key)
            .or_insert_with(|| Arc::new(Throttle::new(HISTO_WINDOW)))
            .clone()
    }

    /// Histo series refresh for `(id, g)`. Fast path: if the record's
    /// `historyLoadedAt_g` already equals the current bucket key, return
    /// the cached histo with no provider call (Open Question 1: the
    /// hourly fast path compares against the *hour* bucket, so hourly
    /// series effectively refresh at most once per hour even inside the
    /// 15-minute throttle -- adopted as observed behaviour).
    pub async fn refresh_histo(&self, id: &str, g: Granularity) -> ThrottleResult<Histo> {
        let throttle = self.histo_throttle(id, g).await;
        let provider = self.provider.clone();
        let store = self.store.clone();
        let registry = self.registry.clone();
        let min_days = self.min_days;
        let id_owned = id.to_string();

        throttle
            .call(move || async move {
                refresh_histo_inner(provider, store, registry, &id_owned, g, min_days).await
            })
            .await
    }
}

async fn refresh_histo_inner(
    provider: Arc<dyn Provider>,
    store: Arc<dyn Store>,
    registry: Arc<CurrencyRegistry>,
    id: &str,
    g: Granularity,
    min_days: u32,
) -> Result<Histo, EngineError> {
    let now = Utc::now();
    let current_key = g.current_bucket_key(now);

    let record = store
        .query_pair_exchange_by_id(id, None)
        .await
        .map_err(EngineError::from)?;

    let Some(record) = record else {
        return Err(EngineError::Store(crate::domain::error::StoreError::new(format!(
            "no such pair-exchange: {id}"
        ))));
    };

    if record.history_loaded_at(g).map(|k| k == current_key).unwrap_or(false) {
        return Ok(record.histo(g).clone());
    }

    let (from, to) = (
        crate::domain::currency::Ticker::new(&record.from),
        crate::domain::currency::Ticker::new(&record.to),
    );

    let points = match provider.fetch_histo_series(id, g, None).await {
        Ok(points) => points,
        Err(e) => {
            warn!(%id, error = %e, "histo refresh failed, serving cached histo");
            return Ok(record.histo(g).clone());
        }
    };

    let mut sorted: Vec<OhlcvrPoint> = points;
    sorted.sort_by(|a, b| b.time.cmp(&a.time));

    let mut histo = Histo::new();
    for point in &sorted {
        let rate = registry
            .to_cent_sat_rate(&from, &to, point.close)
            .map_err(EngineError::from)?;
        if point.time > now - chrono::Duration::milliseconds(g.bucket_ms()) {
            histo.set_latest(rate);
        } else {
            histo.0.insert(g.format_time(point.time), rate);
        }
    }

    store
        .update_histo(id, g, histo.clone())
        .await
        .map_err(EngineError::from)?;

    let yesterday_volume = stats::yesterday_volume(&sorted, now);
    let mut base_stats = PairExchangeStats {
        yesterday_volume: Some(yesterday_volume),
        latest_date: Some(now),
        ..Default::default()
    };
    match g {
        Granularity::Daily => base_stats.history_loaded_at_daily = Some(current_key),
        Granularity::Hourly => base_stats.history_loaded_at_hourly = Some(current_key),
    }

    let derived = if matches!(g, Granularity::Daily) {
        stats::derive_stats(&histo, base_stats, min_days, now)
    } else {
        base_stats
    };

    store
        .update_pair_exchange_stats(id, derived)
        .await
        .map_err(EngineError::from)?;

    info!(%id, granularity = %g, points = sorted.len(), "histo refreshed");
    Ok(histo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::currency::Ticker;
    use crate::domain::provider::MockProvider;
    use crate::domain::store::MockStore;
    use chrono::Duration as ChronoDuration;

    fn registry() -> Arc<CurrencyRegistry> {
        Arc::new(CurrencyRegistry::with_defaults())
    }

    #[tokio::test]
    async fn fast_path_serves_cached_histo_without_calling_provider() {
        let now = Utc::now();
        let current_key = Granularity::Daily.current_bucket_key(now);

        let mut record = PairExchangeRecord::new_default("kraken", "BTC", "USD");
        record.history_loaded_at_daily = Some(current_key);
        record.histo_daily.0.insert("2024-01-01".into(), 42.0);

        let mut provider = MockProvider::new();
        provider.expect_fetch_histo_series().never();

        let mut store = MockStore::new();
        let returned = record.clone();
        store
            .expect_query_pair_exchange_by_id()
            .returning(move |_, _| Ok(Some(returned.clone())));

        let engine = RefreshEngine::new(Arc::new(provider), Arc::new(store), registry(), 30);
        let histo = engine.refresh_histo(&record.id, Granularity::Daily).await.unwrap();
        assert_eq!(histo.0.get("2024-01-01"), Some(&42.0));
    }

    #[tokio::test]
    async fn fresh_fetch_converts_points_and_persists_histo_and_stats() {
        let now = Utc::now();
        let record = PairExchangeRecord::new_default("kraken", "BTC", "USD");

        let points = vec![OhlcvrPoint {
            time: now - ChronoDuration::days(1),
            open: 20_000.0,
            high: 21_000.0,
            low: 19_000.0,
            close: 20_500.0,
            volume: 10.0,
        }];

        let mut provider = MockProvider::new();
        provider
            .expect_fetch_histo_series()
            .returning(move |_, _, _| Ok(points.clone()));

        let mut store = MockStore::new();
        let returned = record.clone();
        store
            .expect_query_pair_exchange_by_id()
            .returning(move |_, _| Ok(Some(returned.clone())));
        store.expect_update_histo().returning(|_, _, _| Ok(()));
        store.expect_update_pair_exchange_stats().returning(|_, _| Ok(()));

        let engine = RefreshEngine::new(Arc::new(provider), Arc::new(store), registry(), 30);
        let histo = engine.refresh_histo(&record.id, Granularity::Daily).await.unwrap();

        let from = Ticker::new("BTC");
        let to = Ticker::new("USD");
        let expected = registry().to_cent_sat_rate(&from, &to, 20_500.0).unwrap();
        let key = Granularity::Daily.format_time(now - ChronoDuration::days(1));
        assert_eq!(histo.0.get(&key), Some(&expected));
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_cached_histo() {
        let mut record = PairExchangeRecord::new_default("kraken", "BTC", "USD");
        record.histo_daily.0.insert("2024-01-01".into(), 7.0);

        let mut provider = MockProvider::new();
        provider
            .expect_fetch_histo_series()
            .returning(|_, _, _| Err(ProviderError::Transient("upstream down".into())));

        let mut store = MockStore::new();
        let returned = record.clone();
        store
            .expect_query_pair_exchange_by_id()
            .returning(move |_, _| Ok(Some(returned.clone())));

        let engine = RefreshEngine::new(Arc::new(provider), Arc::new(store), registry(), 30);
        let histo = engine.refresh_histo(&record.id, Granularity::Daily).await.unwrap();
        assert_eq!(histo.0.get("2024-01-01"), Some(&7.0));
    }
}
