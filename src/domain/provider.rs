//! Provider Contract (component C): the capability set a market-data
//! source must satisfy, abstracted over the concrete HTTP/WebSocket
//! adapters in `infrastructure::providers`.

use crate::domain::error::ProviderError;
use crate::domain::identifier::{Granularity, PairExchange};
use crate::domain::model::{ExchangeRecord, OhlcvrPoint, PriceUpdate};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// A cold, cancellable subscription handle. Dropping it (or calling
/// `unsubscribe` explicitly) MUST close the underlying transport exactly
/// once; this is the "scoped resource" design note.
#[async_trait]
pub trait Subscription: Send {
    async fn unsubscribe(&mut self);
}

/// Capability set a market-data source must satisfy (§4.C).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provider: Send + Sync {
    /// One-time readiness check (credentials, connectivity). Fails fast.
    async fn init(&self) -> Result<(), ProviderError>;

    /// Enumerates all spot pairs, filtered so both tickers are supported
    /// by the registry -- the provider is handed the registry so the
    /// filtering happens at the source, not downstream.
    async fn fetch_available_pair_exchanges(&self) -> Result<Vec<PairExchange>, ProviderError>;

    async fn fetch_exchanges(&self) -> Result<Vec<ExchangeRecord>, ProviderError>;

    /// Most recent points first or last -- callers MUST sort. Internal
    /// pagination is transparent to the caller, capped at
    /// `MAX_PAGINATION_PAGES`, logged (not fatal) if the cap is hit.
    async fn fetch_histo_series(
        &self,
        pair_exchange_id: &str,
        granularity: Granularity,
        limit: Option<usize>,
    ) -> Result<Vec<OhlcvrPoint>, ProviderError>;

    /// Opens one cold subscription producing price updates. Returns the
    /// stream plus an unsubscribe handle; the handle guarantees the
    /// transport is closed exactly once regardless of how the stream
    /// ends (error, natural completion, supervisor reboot).
    async fn subscribe_price_update(
        &self,
    ) -> Result<(BoxStream<'static, PriceUpdate>, Box<dyn Subscription>), ProviderError>;

    /// Optional capability: ranked list of crypto ticker symbols by
    /// market capitalisation (component J). Not every provider need
    /// support this -- the default errs as transient so the market-cap
    /// ranker can be wired to a dedicated source independent of the
    /// rate provider.
    async fn fetch_market_cap_ranking(&self) -> Result<Vec<String>, ProviderError> {
        Err(ProviderError::Transient(
            "market-cap ranking not supported by this provider".into(),
        ))
    }
}

/// Hard iteration cap for providers that page internally (§4.C, §9).
pub const MAX_PAGINATION_PAGES: usize = 100;

/// At most this many concurrent live-price subscriptions may be open at
/// once; exceeding it is a programming error and fatal (§4.H).
pub const MAX_WEBSOCKET: usize = 2;

/// Tagged provider selection, built from the `PROVIDER` env var (§6, §9
/// "Provider polymorphism").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    CoinApi,
    CryptoCompare,
    Kaiko,
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coinapi" => Ok(ProviderKind::CoinApi),
            "cryptocompare" => Ok(ProviderKind::CryptoCompare),
            "kaiko" => Ok(ProviderKind::Kaiko),
            other => Err(ConfigParseError(format!("unknown PROVIDER: {other}"))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ConfigParseError(pub String);
