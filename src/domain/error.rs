//! Error taxonomy for the countervalue engine.
//!
//! Mirrors the five-member taxonomy the engine's design calls for:
//! configuration failures are fatal at startup, provider failures are
//! either transient (retried by the caller's scheduling) or data errors
//! (skip the offending item), store failures propagate to the caller,
//! and client errors become HTTP 400s.

use thiserror::Error;

/// Missing credentials, unknown `PROVIDER`/`DATABASE` selection. Fatal at startup.
#[derive(Debug, Error)]
#[error("config error: {0}")]
pub struct ConfigError(pub String);

impl ConfigError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Errors a provider call can fail with.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP 5xx, timeout, WebSocket disconnect. Retried by the caller's
    /// scheduling (next throttle window) or the supervisor restart loop.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Unparseable payload, or a ticker that fails the post-filter.
    /// Logged and the offending item skipped; never fails the caller.
    #[error("data error: {0}")]
    Data(String),
}

/// Errors the store contract can fail with. Propagated to the caller of
/// the engine operation; callers downgrade to cached reads where possible.
#[derive(Debug, Error)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(e: mongodb::error::Error) -> Self {
        StoreError(e.to_string())
    }
}

/// Errors surfaced by engine operations used by the Read Service and the
/// refresh jobs. Deliberately flat: callers match on variant to decide
/// whether to retry, skip, or fall back to the cached view.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("unknown ticker: {0}")]
    UnknownTicker(String),
}

/// Invalid HTTP request. Carries the message returned verbatim in the
/// 400 body, per the validation rules in the HTTP API table.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ClientError(pub String);

impl ClientError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
