use crate::api::doc::ApiDoc;
use crate::api::handlers::{
    exchanges_handler, health_detail_handler, health_handler, health_noop_handler, metrics_handler,
    rates_handler, tickers_handler,
};
use crate::api::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// CORS is permissive per §6.
pub fn create_router(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::with_status_code(
            axum::http::StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(60),
        ));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/rates/{granularity}", post(rates_handler))
        .route("/exchanges/{from}/{to}", get(exchanges_handler))
        .route("/tickers", get(tickers_handler))
        .route("/_health", get(health_handler))
        .route("/_health/noop", get(health_noop_handler))
        .route("/_health/detail", get(health_detail_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware)
        .with_state(state)
}
