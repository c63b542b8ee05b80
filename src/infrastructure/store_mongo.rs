//! `MongoStore`: the concrete `Store` implementation backed by the
//! official `mongodb` driver. Grounded on the document-upsert idiom
//! (`collection::<T>(name)`, `doc! {...}` filters, `FindOptions` for
//! sort) the retrieved pack's CRS-trading-service token repository uses.

use crate::domain::error::StoreError;
use crate::domain::identifier::Granularity;
use crate::domain::model::{
    ExchangeRecord, Histo, MarketCapSnapshot, Meta, PairExchangeRecord, PairExchangeStats,
};
use crate::domain::store::{Projection, Store};
use async_trait::async_trait;
use bson::{doc, Bson};
use futures_util::StreamExt;
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};

const EXCHANGES: &str = "exchanges";
const PAIR_EXCHANGES: &str = "pairExchanges";
const MARKETCAP_COINS: &str = "marketcap_coins";
const META: &str = "meta";
const META_SINGLETON_KEY: &str = "meta_1";

pub struct MongoStore {
    db: mongodb::Database,
}

impl MongoStore {
    pub async fn connect(uri: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await?;
        let db_name = mongodb::options::ClientOptions::parse(uri)
            .await
            .ok()
            .and_then(|o| o.default_database)
            .unwrap_or_else(|| "ledger-countervalue".to_string());
        let db = client.database(&db_name);
        let store = Self { db };
        store.ensure_indexes().await?;
        Ok(store)
    }

    fn pair_exchanges(&self) -> Collection<PairExchangeRecord> {
        self.db.collection(PAIR_EXCHANGES)
    }

    fn exchanges(&self) -> Collection<ExchangeRecord> {
        self.db.collection(EXCHANGES)
    }

    fn marketcap(&self) -> Collection<MarketCapSnapshot> {
        self.db.collection(MARKETCAP_COINS)
    }

    fn meta_collection(&self) -> Collection<bson::Document> {
        self.db.collection(META)
    }

    /// The store SHOULD index on `id` (unique, satisfied for free since
    /// `_id` already is), `from_to`, and `day` (unique).
    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        self.pair_exchanges()
            .create_index(IndexModel::builder().keys(doc! { "from_to": 1 }).build())
            .await?;
        self.marketcap()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "_id": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .ok(); // `_id` is already unique; tolerate a no-op/duplicate error here.
        Ok(())
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn insert_pair_exchange_data(&self, records: Vec<PairExchangeRecord>) -> Result<(), StoreError> {
        let collection = self.pair_exchanges();
        for record in records {
            let filter = doc! { "_id": &record.id };
            let exists = collection.find_one(filter.clone()).await?.is_some();
            if !exists {
                collection.insert_one(&record).await?;
            }
        }
        Ok(())
    }

    async fn update_live_rates(&self, updates: Vec<(String, f64)>) -> Result<(), StoreError> {
        if updates.is_empty() {
            return Ok(());
        }
        let collection = self.pair_exchanges();
        let now = bson::DateTime::now();
        for (id, rate) in updates {
            collection
                .update_one(
                    doc! { "_id": &id },
                    doc! { "$set": { "latest": rate, "latest_date": now } },
                )
                .await?;
        }
        self.touch_meta("last_live_rates_sync").await
    }

    async fn update_histo(
        &self,
        id: &str,
        granularity: Granularity,
        histo: Histo,
    ) -> Result<(), StoreError> {
        let field = match granularity {
            Granularity::Daily => "histo_daily",
            Granularity::Hourly => "histo_hourly",
        };
        let value = bson::to_bson(&histo).map_err(|e| StoreError::new(e.to_string()))?;
        self.pair_exchanges()
            .update_one(doc! { "_id": id }, doc! { "$set": { field: value } })
            .await?;
        Ok(())
    }

    async fn update_pair_exchange_stats(
        &self,
        id: &str,
        stats: PairExchangeStats,
    ) -> Result<(), StoreError> {
        let mut set = bson::Document::new();
        macro_rules! set_if_some {
            ($field:literal, $value:expr) => {
                if let Some(v) = $value {
                    set.insert($field, bson::to_bson(&v).map_err(|e| StoreError::new(e.to_string()))?);
                }
            };
        }
        set_if_some!("has_history_for_30_last_days", stats.has_history_for_30_last_days);
        set_if_some!("has_history_for_1_year", stats.has_history_for_1_year);
        set_if_some!("oldest_day_ago", stats.oldest_day_ago);
        set_if_some!("yesterday_volume", stats.yesterday_volume);
        set_if_some!("history_loaded_at_daily", stats.history_loaded_at_daily);
        set_if_some!("history_loaded_at_hourly", stats.history_loaded_at_hourly);
        set_if_some!("latest_date", stats.latest_date);

        if set.is_empty() {
            return Ok(());
        }
        self.pair_exchanges()
            .update_one(doc! { "_id": id }, doc! { "$set": set })
            .await?;
        Ok(())
    }

    async fn update_exchanges(&self, exchanges: Vec<ExchangeRecord>) -> Result<(), StoreError> {
        let collection = self.exchanges();
        for exchange in exchanges {
            collection
                .replace_one(doc! { "id": &exchange.id }, &exchange)
                .upsert(true)
                .await?;
        }
        Ok(())
    }

    async fn update_market_cap_coins(&self, day: &str, coins: Vec<String>) -> Result<(), StoreError> {
        let snapshot = MarketCapSnapshot {
            day: day.to_string(),
            coins,
        };
        self.marketcap()
            .replace_one(doc! { "_id": day }, &snapshot)
            .upsert(true)
            .await?;
        self.touch_meta("last_market_cap_sync").await
    }

    async fn query_pair_exchanges_by_pair(
        &self,
        pairs: &[(String, String)],
    ) -> Result<Vec<PairExchangeRecord>, StoreError> {
        if pairs.is_empty() {
            return Ok(vec![]);
        }
        let or_clauses: Vec<Bson> = pairs
            .iter()
            .map(|(from, to)| Bson::Document(doc! { "from_to": format!("{from}_{to}") }))
            .collect();
        let mut cursor = self
            .pair_exchanges()
            .find(doc! { "$or": or_clauses })
            .await?;
        let mut out = Vec::new();
        while let Some(doc) = cursor.next().await {
            out.push(doc?);
        }
        Ok(out)
    }

    async fn query_pair_exchange_by_id(
        &self,
        id: &str,
        _projection: Option<Projection>,
    ) -> Result<Option<PairExchangeRecord>, StoreError> {
        Ok(self.pair_exchanges().find_one(doc! { "_id": id }).await?)
    }

    async fn query_pair_exchange_ids(&self) -> Result<Vec<String>, StoreError> {
        // Project to `_id` only via a raw `Document` cursor -- decoding
        // straight into `PairExchangeRecord` with a partial projection
        // would fail deserialization on the missing required fields.
        let raw: Collection<bson::Document> = self.db.collection(PAIR_EXCHANGES);
        let mut cursor = raw.find(doc! {}).projection(doc! { "_id": 1 }).await?;
        let mut ids = Vec::new();
        while let Some(doc) = cursor.next().await {
            let doc = doc?;
            if let Ok(id) = doc.get_str("_id") {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }

    async fn query_exchanges(&self) -> Result<Vec<ExchangeRecord>, StoreError> {
        let mut cursor = self.exchanges().find(doc! {}).await?;
        let mut out = Vec::new();
        while let Some(doc) = cursor.next().await {
            out.push(doc?);
        }
        Ok(out)
    }

    async fn query_market_cap_coins_for_day(
        &self,
        day: &str,
    ) -> Result<Option<MarketCapSnapshot>, StoreError> {
        Ok(self.marketcap().find_one(doc! { "_id": day }).await?)
    }

    async fn status_db(&self) -> Result<(), StoreError> {
        let count = self.pair_exchanges().estimated_document_count().await?;
        if count == 0 {
            return Err(StoreError::new("pair-exchange collection is empty"));
        }
        Ok(())
    }

    async fn get_meta(&self) -> Result<Meta, StoreError> {
        let doc = self.meta_collection().find_one(doc! { "_id": META_SINGLETON_KEY }).await?;
        let Some(doc) = doc else {
            return Ok(Meta::default());
        };
        let last_live = doc
            .get_datetime("last_live_rates_sync")
            .ok()
            .map(|d| d.to_chrono())
            .unwrap_or_else(|| Meta::default().last_live_rates_sync);
        let last_mc = doc
            .get_datetime("last_market_cap_sync")
            .ok()
            .map(|d| d.to_chrono())
            .unwrap_or_else(|| Meta::default().last_market_cap_sync);
        Ok(Meta {
            last_live_rates_sync: last_live,
            last_market_cap_sync: last_mc,
        })
    }
}

impl MongoStore {
    async fn touch_meta(&self, field: &str) -> Result<(), StoreError> {
        self.meta_collection()
            .update_one(
                doc! { "_id": META_SINGLETON_KEY },
                doc! { "$set": { field: bson::DateTime::now() } },
            )
            .upsert(true)
            .await?;
        Ok(())
    }
}
