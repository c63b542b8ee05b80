//! countervalue: a counter-value cache and distribution service for
//! crypto/fiat exchange rates.
//!
//! The crate is organised into an onion layering:
//! - **domain**: currency registry, identifiers, the `Provider`/`Store`
//!   contracts, and the persisted entity types.
//! - **engine**: the ingestion/cache logic -- throttled refresh,
//!   derived statistics, the live-price pipeline, prefetch, market-cap
//!   ranking, and the read-only query facade.
//! - **infrastructure**: concrete adapters -- MongoDB store, the three
//!   rate providers, and environment-driven configuration.
//! - **api**: HTTP surface (axum handlers, routing, OpenAPI docs).

pub mod api;
pub mod domain;
pub mod engine;
pub mod infrastructure;
