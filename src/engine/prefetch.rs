//! Prefetch Scheduler (component I): paced enumeration of all pairs for
//! background warming.

use crate::domain::identifier::Granularity;
use crate::domain::store::Store;
use crate::engine::refresh::{RefreshEngine, HISTO_WINDOW};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const PREFETCH_PERIOD: Duration = Duration::from_secs(4 * 3600);

pub struct PrefetchScheduler {
    store: Arc<dyn Store>,
    refresh: Arc<RefreshEngine>,
}

impl PrefetchScheduler {
    pub fn new(store: Arc<dyn Store>, refresh: Arc<RefreshEngine>) -> Self {
        Self { store, refresh }
    }

    /// One full cycle: enumerate all pair-exchanges, sorted by
    /// `latestDate DESC` (nulls last), refreshing daily then hourly for
    /// each, pacing so the total cycle length approximates the histo
    /// throttle window.
    pub async fn run_once(&self) {
        let ids = match self.store.query_pair_exchange_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "prefetch: failed to enumerate pair-exchange ids");
                return;
            }
        };

        let mut with_latest = Vec::with_capacity(ids.len());
        for id in ids {
            let latest_date = self
                .store
                .query_pair_exchange_by_id(&id, None)
                .await
                .ok()
                .flatten()
                .and_then(|r| r.latest_date);
            with_latest.push((id, latest_date));
        }
        with_latest.sort_by(|a, b| match (a.1, b.1) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        let n = with_latest.len().max(1);
        let sleep_between = HISTO_WINDOW / n as u32;

        for (id, _) in &with_latest {
            if let Err(e) = self.refresh.refresh_histo(id, Granularity::Daily).await {
                warn!(%id, error = %e, "prefetch: daily histo refresh failed");
            }
            if let Err(e) = self.refresh.refresh_histo(id, Granularity::Hourly).await {
                warn!(%id, error = %e, "prefetch: hourly histo refresh failed");
            }
            tokio::time::sleep(sleep_between).await;
        }

        info!(pairs = with_latest.len(), "prefetch cycle complete");
    }

    /// Runs as a recurrent job with period 4h, until `shutdown` fires.
    /// Skipped entirely (never spawned) when `DISABLE_PREFETCH` is truthy.
    pub async fn run_forever(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(PREFETCH_PERIOD);
        loop {
            tokio::select! {
                _ = interval.tick() => self.run_once().await,
                _ = shutdown.changed() => return,
            }
        }
    }
}
