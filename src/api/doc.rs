use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::rates_handler,
        crate::api::handlers::exchanges_handler,
        crate::api::handlers::tickers_handler,
        crate::api::handlers::health_handler,
        crate::api::handlers::health_noop_handler,
        crate::api::handlers::health_detail_handler,
        crate::api::handlers::metrics_handler
    ),
    components(
        schemas(
            crate::api::handlers::RatesRequest,
            crate::api::handlers::HealthResponse,
            crate::api::handlers::ServiceStatus
        )
    ),
    tags(
        (name = "rates", description = "Counter-value rate lookups"),
        (name = "exchanges", description = "Exchange enumeration for a pair"),
        (name = "tickers", description = "Market-cap ranked crypto tickers"),
        (name = "system", description = "Health checks and metrics")
    ),
    info(
        title = "Countervalue API",
        version = "0.1.0",
        description = "Counter-value cache and distribution service for crypto/fiat exchange rates.",
    )
)]
pub struct ApiDoc;
