//! Store Contract (component D): the abstract persistent operations the
//! engine relies on. Semantics are the design contract, not a schema --
//! see `infrastructure::store_mongo::MongoStore` for the concrete
//! implementation.

use crate::domain::error::StoreError;
use crate::domain::model::{
    ExchangeRecord, Histo, MarketCapSnapshot, Meta, PairExchangeRecord, PairExchangeStats,
};
use async_trait::async_trait;

/// Optional field projection for `query_pair_exchange_by_id` -- `None`
/// returns the full document, `Some` is a hint implementations may use
/// to avoid transferring unused history data.
#[derive(Debug, Clone, Default)]
pub struct Projection {
    pub fields: Vec<&'static str>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert-if-absent per id; never overwrites existing derived data.
    async fn insert_pair_exchange_data(
        &self,
        records: Vec<PairExchangeRecord>,
    ) -> Result<(), StoreError>;

    /// Atomic per-id set of `latest`/`latestDate = now`; also refreshes
    /// `meta.lastLiveRatesSync`.
    async fn update_live_rates(&self, updates: Vec<(String, f64)>) -> Result<(), StoreError>;

    /// Replaces that granularity's histo wholesale.
    async fn update_histo(&self, id: &str, granularity: crate::domain::identifier::Granularity, histo: Histo)
        -> Result<(), StoreError>;

    /// Partial merge of named statistic fields.
    async fn update_pair_exchange_stats(
        &self,
        id: &str,
        stats: PairExchangeStats,
    ) -> Result<(), StoreError>;

    async fn update_exchanges(&self, exchanges: Vec<ExchangeRecord>) -> Result<(), StoreError>;

    /// Upsert by day; refreshes `meta.lastMarketCapSync`.
    async fn update_market_cap_coins(&self, day: &str, coins: Vec<String>) -> Result<(), StoreError>;

    async fn query_pair_exchanges_by_pair(
        &self,
        pairs: &[(String, String)],
    ) -> Result<Vec<PairExchangeRecord>, StoreError>;

    async fn query_pair_exchange_by_id(
        &self,
        id: &str,
        projection: Option<Projection>,
    ) -> Result<Option<PairExchangeRecord>, StoreError>;

    async fn query_pair_exchange_ids(&self) -> Result<Vec<String>, StoreError>;

    async fn query_exchanges(&self) -> Result<Vec<ExchangeRecord>, StoreError>;

    async fn query_market_cap_coins_for_day(
        &self,
        day: &str,
    ) -> Result<Option<MarketCapSnapshot>, StoreError>;

    /// Fails if the pair-exchange collection is empty.
    async fn status_db(&self) -> Result<(), StoreError>;

    /// Returns meta with zero-instant defaults if unset.
    async fn get_meta(&self) -> Result<Meta, StoreError>;
}
