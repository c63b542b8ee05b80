//! Core business entities and contracts: the currency registry, the
//! canonical identifier codec, the persisted data model, and the
//! provider/store traits the engine is built against.

pub mod currency;
pub mod error;
pub mod identifier;
pub mod model;
pub mod provider;
pub mod store;

pub use currency::{CurrencyRegistry, Ticker};
pub use error::{ClientError, ConfigError, EngineError, ProviderError, StoreError};
pub use identifier::{build_id, parse_id, Granularity, Pair, PairExchange};
pub use model::{
    ExchangeRecord, Histo, MarketCapSnapshot, Meta, OhlcvrPoint, PairExchangeRecord,
    PairExchangeStats, PriceUpdate, Rate, LATEST_KEY,
};
pub use provider::{Provider, ProviderKind, Subscription, MAX_PAGINATION_PAGES, MAX_WEBSOCKET};
pub use store::{Projection, Store};
