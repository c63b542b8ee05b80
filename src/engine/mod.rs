//! The ingestion/cache engine: throttled refresh orchestration, the
//! streaming live-price pipeline, derived statistics, and the
//! pure-read query facade. This module is the sole subject of the
//! design -- everything in `infrastructure` and `api` exists to give it
//! real collaborators to run against.

pub mod live;
pub mod marketcap;
pub mod prefetch;
pub mod read_service;
pub mod refresh;
pub mod stats;
pub mod throttle;

pub use live::{supervise, LivePricePipeline, WebSocketBudget};
pub use marketcap::MarketCapRanker;
pub use prefetch::PrefetchScheduler;
pub use read_service::{HistoResponse, PairData, ReadService, RequestPair};
pub use refresh::RefreshEngine;
pub use throttle::{Throttle, ThrottleResult};
