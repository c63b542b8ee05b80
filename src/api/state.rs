use crate::domain::currency::CurrencyRegistry;
use crate::domain::store::Store;
use crate::engine::{ReadService, RefreshEngine};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct AppState {
    pub read_service: Arc<ReadService>,
    pub refresh: Arc<RefreshEngine>,
    pub store: Arc<dyn Store>,
    pub registry: Arc<CurrencyRegistry>,
    pub metrics: PrometheusHandle,
    pub version: &'static str,
}

impl AppState {
    pub fn new(
        read_service: Arc<ReadService>,
        refresh: Arc<RefreshEngine>,
        store: Arc<dyn Store>,
        registry: Arc<CurrencyRegistry>,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            read_service,
            refresh,
            store,
            registry,
            metrics,
            version: VERSION,
        }
    }
}
