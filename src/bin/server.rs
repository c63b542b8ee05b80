//! The read-path HTTP server. Loads configuration, wires the engine's
//! collaborators against the MongoDB store and the selected rate
//! provider, and serves the HTTP API (§6). When `HACK_SYNC_IN_SERVER`
//! is set, also spawns the background sync jobs in-process rather than
//! requiring the separate `countervalue-sync` binary.

use anyhow::Context;
use countervalue::domain::currency::CurrencyRegistry;
use countervalue::engine::{LivePricePipeline, MarketCapRanker, PrefetchScheduler, ReadService, RefreshEngine, WebSocketBudget};
use countervalue::infrastructure::providers::build_market_cap_provider;
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

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

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
    let market_cap_provider = build_market_cap_provider(&config, provider.clone());
    let marketcap = Arc::new(MarketCapRanker::new(market_cap_provider, store.clone(), registry.clone()));
    let read_service = Arc::new(ReadService::new(
        refresh.clone(),
        store.clone(),
        marketcap.clone(),
        &config.blacklist_exchanges,
    ));

    let state = countervalue::api::AppState::new(
        read_service,
        refresh.clone(),
        store.clone(),
        registry.clone(),
        metrics_handle,
    );
    let app = countervalue::api::create_router(state);

    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    if config.hack_sync_in_server {
        tracing::info!("HACK_SYNC_IN_SERVER set, spawning background sync jobs in-process");
        let budget = Arc::new(WebSocketBudget::new());
        let pipeline = Arc::new(LivePricePipeline::new(
            provider.clone(),
            store.clone(),
            registry.clone(),
            refresh.clone(),
            config.debug_live_rates,
        ));
        tokio::spawn(countervalue::engine::supervise(pipeline, budget, shutdown_rx.clone()));

        if !config.disable_prefetch {
            let prefetch = Arc::new(PrefetchScheduler::new(store.clone(), refresh.clone()));
            tokio::spawn(prefetch.run_forever(shutdown_rx.clone()));
        } else {
            tracing::info!("DISABLE_PREFETCH set, skipping prefetch scheduler");
        }
    }

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to address {addr}"))?;
    tracing::info!("countervalue server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error during operation")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => tracing::info!("received SIGTERM, initiating graceful shutdown"),
    }
}
