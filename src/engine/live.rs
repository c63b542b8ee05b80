//! Live-Price Pipeline (component H): subscribe -> filter/normalise ->
//! time-buffer -> coalesce -> store, plus the supervisor loop that keeps
//! it running (§4.H, §9 "scoped resource" / "global state" notes).

use crate::domain::currency::{CurrencyRegistry, Ticker};
use crate::domain::error::EngineError;
use crate::domain::identifier::parse_id;
use crate::domain::model::PriceUpdate;
use crate::domain::provider::{Provider, MAX_WEBSOCKET};
use crate::domain::store::Store;
use crate::engine::refresh::RefreshEngine;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// `websocketTotal`: a process-wide counter of concurrently open
/// subscriptions. Acquiring a slot past `MAX_WEBSOCKET` is a programming
/// error and is fatal, per §4.H/§6.
pub struct WebSocketBudget {
    count: AtomicUsize,
}

impl WebSocketBudget {
    pub fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
        }
    }

    /// Acquire a slot, panicking if it would exceed `MAX_WEBSOCKET`.
    pub fn acquire(self: &Arc<Self>) -> WsSlot {
        let previous = self.count.fetch_add(1, Ordering::SeqCst);
        if previous >= MAX_WEBSOCKET {
            panic!("MAX_WEBSOCKET exceeded: {previous} subscriptions already open");
        }
        WsSlot {
            budget: self.clone(),
        }
    }
}

impl Default for WebSocketBudget {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard releasing its websocket slot exactly once on drop,
/// regardless of which path (error, natural completion, forced reboot)
/// the pipeline exits through.
pub struct WsSlot {
    budget: Arc<WebSocketBudget>,
}

impl Drop for WsSlot {
    fn drop(&mut self) {
        self.budget.count.fetch_sub(1, Ordering::SeqCst);
    }
}

pub const LIVE_RATES_BUFFER_WINDOW: Duration = Duration::from_secs(1);
pub const RESTART_AFTER_ERROR: Duration = Duration::from_secs(60);
pub const RESTART_AFTER_COMPLETION: Duration = Duration::from_secs(30);
pub const AUTO_REBOOT_AFTER: Duration = Duration::from_secs(4 * 3600);
pub const AUTO_REBOOT_SETTLE: Duration = Duration::from_secs(10);

pub struct LivePricePipeline {
    provider: Arc<dyn Provider>,
    store: Arc<dyn Store>,
    registry: Arc<CurrencyRegistry>,
    refresh: Arc<RefreshEngine>,
    debug_live_rates: bool,
}

impl LivePricePipeline {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<dyn Store>,
        registry: Arc<CurrencyRegistry>,
        refresh: Arc<RefreshEngine>,
        debug_live_rates: bool,
    ) -> Self {
        Self {
            provider,
            store,
            registry,
            refresh,
            debug_live_rates,
        }
    }

    /// Runs the pipeline to completion (error, stream end, or external
    /// cancellation). Returns `Ok(())` on a clean unsubscribe.
    pub async fn run(&self, budget: &Arc<WebSocketBudget>) -> Result<(), EngineError> {
        // Ensure the available-pair-exchanges refresh has run at least once.
        if let Err(e) = self.refresh.refresh_available_pair_exchanges().await {
            warn!(error = %e, "available pair-exchanges refresh failed before live subscribe");
        }

        let _slot = budget.acquire();
        let (mut stream, mut subscription) = self.provider.subscribe_price_update().await?;

        let mut buffer: HashMap<String, f64> = HashMap::new();
        let mut ticker = tokio::time::interval(LIVE_RATES_BUFFER_WINDOW);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                item = stream.next() => {
                    match item {
                        Some(update) => self.normalise_into(&update, &mut buffer),
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    self.flush(&mut buffer).await;
                }
            }
        }

        self.flush(&mut buffer).await;
        subscription.unsubscribe().await;
        Ok(())
    }

    fn normalise_into(&self, update: &PriceUpdate, buffer: &mut HashMap<String, f64>) {
        let Some((_, from, to)) = parse_id(&update.pair_exchange_id) else {
            return;
        };
        if !self.registry.is_supported(&from) || !self.registry.is_supported(&to) {
            return;
        }
        let Ok(rate) = self.registry.to_cent_sat_rate(&from, &to, update.price) else {
            return;
        };
        // Coalesce: last write wins within the buffer window.
        buffer.insert(update.pair_exchange_id.clone(), rate);
    }

    async fn flush(&self, buffer: &mut HashMap<String, f64>) {
        if buffer.is_empty() {
            return;
        }
        let batch: Vec<(String, f64)> = buffer.drain().collect();
        if self.debug_live_rates {
            info!(batch_size = batch.len(), "live-rate batch flush");
        }
        if let Err(e) = self.store.update_live_rates(batch).await {
            error!(error = %e, "failed to write live-rate batch");
        }
    }
}

/// Supervisor loop (§4.H): restart after error (60s), restart after
/// natural completion (30s), forced auto-reboot after 4h of uptime
/// (unsubscribe then wait 10s before relaunching). Runs until the
/// process is asked to stop via `shutdown`.
pub async fn supervise(
    pipeline: Arc<LivePricePipeline>,
    budget: Arc<WebSocketBudget>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        let started = tokio::time::Instant::now();
        let run = pipeline.run(&budget);
        let reboot = tokio::time::sleep(AUTO_REBOOT_AFTER);

        tokio::select! {
            result = run => {
                match result {
                    Ok(()) => {
                        info!("live-price pipeline completed naturally, restarting in {:?}", RESTART_AFTER_COMPLETION);
                        tokio::time::sleep(RESTART_AFTER_COMPLETION).await;
                    }
                    Err(e) => {
                        error!(error = %e, "live-price pipeline errored, restarting in {:?}", RESTART_AFTER_ERROR);
                        tokio::time::sleep(RESTART_AFTER_ERROR).await;
                    }
                }
            }
            _ = reboot => {
                warn!(uptime = ?started.elapsed(), "forced auto-reboot of live-price pipeline");
                tokio::time::sleep(AUTO_REBOOT_SETTLE).await;
            }
            _ = shutdown.changed() => {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "MAX_WEBSOCKET exceeded")]
    fn exceeding_max_websocket_is_fatal() {
        let budget = Arc::new(WebSocketBudget::new());
        let _a = budget.acquire();
        let _b = budget.acquire();
        let _c = budget.acquire();
    }

    #[test]
    fn releasing_a_slot_frees_budget_for_reuse() {
        let budget = Arc::new(WebSocketBudget::new());
        {
            let _a = budget.acquire();
            let _b = budget.acquire();
        }
        let _c = budget.acquire();
        let _d = budget.acquire();
    }

    #[test]
    fn s4_live_batch_coalescing() {
        let registry = CurrencyRegistry::with_defaults();
        let mut buffer: HashMap<String, f64> = HashMap::new();
        let from = Ticker::new("BTC");
        let to = Ticker::new("USD");

        for (id, price) in [("A", 10.0), ("B", 20.0), ("A", 11.0), ("A", 12.0)] {
            let rate = registry.to_cent_sat_rate(&from, &to, price).unwrap();
            buffer.insert(id.to_string(), rate);
        }

        assert_eq!(buffer.len(), 2);
        let expected_a = registry.to_cent_sat_rate(&from, &to, 12.0).unwrap();
        assert_eq!(buffer["A"], expected_a);
        let expected_b = registry.to_cent_sat_rate(&from, &to, 20.0).unwrap();
        assert_eq!(buffer["B"], expected_b);
    }
}
