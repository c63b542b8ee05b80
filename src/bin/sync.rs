//! The background sync process: supervises the live-price pipeline and
//! runs the prefetch scheduler. Split from `countervalue-server` so a
//! deployment can scale reads and ingestion independently; set
//! `HACK_SYNC_IN_SERVER` to co-locate them instead and skip this binary.

use anyhow::Context;
use countervalue::domain::currency::CurrencyRegistry;
use countervalue::engine::{LivePricePipeline, MarketCapRanker, PrefetchScheduler, RefreshEngine, WebSocketBudget};
use countervalue::infrastructure::{build_provider, AppConfig, MongoStore};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into())))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    let registry = Arc::new(CurrencyRegistry::with_defaults());

    let store: Arc<dyn countervalue::domain::Store> = Arc::new(
        MongoStore::connect(&config.mongodb_uri)
            .await
            .context("failed to connect to MongoDB")?,
    );

    let provider = build_provider(&config, registry.clone()).context("failed to build rate provider")?;
    provider.init().await.context("provider readiness check failed")?;

    let refresh = Arc::new(RefreshEngine::new(
        provider.clone(),
        store.clone(),
        registry.clone(),
        config.min_days(),
    ));

    // Market-cap ranking is polled independently of the live pipeline; a
    // dedicated interval loop is enough since `MarketCapRanker::refresh`
    // already no-ops once today's snapshot is stored.
    let market_cap_provider = countervalue::infrastructure::providers::build_market_cap_provider(&config, provider.clone());
    let marketcap = Arc::new(MarketCapRanker::new(market_cap_provider, store.clone(), registry.clone()));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let budget = Arc::new(WebSocketBudget::new());
    let pipeline = Arc::new(LivePricePipeline::new(
        provider.clone(),
        store.clone(),
        registry.clone(),
        refresh.clone(),
        config.debug_live_rates,
    ));
    let live_task = tokio::spawn(countervalue::engine::supervise(pipeline, budget, shutdown_rx.clone()));

    let prefetch_task = if config.disable_prefetch {
        tracing::info!("DISABLE_PREFETCH set, skipping prefetch scheduler");
        None
    } else {
        let prefetch = Arc::new(PrefetchScheduler::new(store.clone(), refresh.clone()));
        Some(tokio::spawn(prefetch.run_forever(shutdown_rx.clone())))
    };

    let marketcap_task = tokio::spawn(run_market_cap_loop(marketcap, shutdown_rx.clone()));

    tokio::signal::ctrl_c().await.context("failed to install Ctrl+C handler")?;
    tracing::info!("received shutdown signal, stopping sync jobs");
    let _ = shutdown_tx.send(true);

    let _ = live_task.await;
    if let Some(task) = prefetch_task {
        let _ = task.await;
    }
    let _ = marketcap_task.await;

    Ok(())
}

async fn run_market_cap_loop(
    marketcap: Arc<MarketCapRanker>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(countervalue::engine::marketcap::MARKET_CAP_THROTTLE_WINDOW);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = marketcap.refresh().await {
                    tracing::warn!(error = %e, "market-cap refresh failed");
                }
            }
            _ = shutdown.changed() => return,
        }
    }
}
