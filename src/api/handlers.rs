//! Thin validation layer over the Read Service (§6's HTTP API table).

use crate::api::error::AppError;
use crate::api::state::AppState;
use crate::domain::error::ClientError;
use crate::domain::identifier::Granularity;
use crate::engine::read_service::{HistoResponse, RequestPair};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const MAX_PAIRS: usize = 100;
const LIVE_RATES_STALE_AFTER: chrono::Duration = chrono::Duration::minutes(5);
const MARKET_CAP_STALE_AFTER: chrono::Duration = chrono::Duration::hours(25);

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(untagged)]
enum AtField {
    One(String),
    Many(Vec<String>),
}

impl AtField {
    fn into_vec(self) -> Vec<String> {
        match self {
            AtField::One(s) => vec![s],
            AtField::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
struct RatesPairRequest {
    from: String,
    to: String,
    exchange: Option<String>,
    after: Option<String>,
    #[serde(rename = "afterDay")]
    after_day: Option<String>,
    at: Option<AtField>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct RatesRequest {
    #[validate(length(min = 1, max = 100, message = "pairs must contain between 1 and 100 entries"))]
    pairs: Vec<RatesPairRequest>,
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, ClientError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| ClientError::new(format!("invalid date/time: {s}")))
}

fn validate_and_convert(
    granularity: Granularity,
    request: RatesRequest,
) -> Result<Vec<RequestPair>, ClientError> {
    request.validate().map_err(|e| ClientError::new(e.to_string()))?;

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(request.pairs.len());

    for pair in request.pairs {
        let key = (
            pair.from.to_ascii_uppercase(),
            pair.to.to_ascii_uppercase(),
            pair.exchange.as_ref().map(|e| e.to_ascii_lowercase()),
        );
        if !seen.insert(key) {
            return Err(ClientError::new("pairs must not contain duplicates"));
        }

        if pair.after_day.is_some() && granularity != Granularity::Daily {
            return Err(ClientError::new("afterDay is only accepted for daily granularity"));
        }

        let after = match (pair.after, pair.after_day) {
            (Some(_), Some(_)) => {
                return Err(ClientError::new("after and afterDay are mutually exclusive"));
            }
            (Some(a), None) => Some(parse_instant(&a)?),
            (None, Some(a)) => Some(parse_instant(&a)?),
            (None, None) => None,
        };

        out.push(RequestPair {
            from: pair.from,
            to: pair.to,
            exchange: pair.exchange,
            after,
            at: pair.at.map(AtField::into_vec),
        });
    }

    Ok(out)
}

#[utoipa::path(
    post,
    path = "/rates/{granularity}",
    params(("granularity" = String, Path, description = "daily or hourly")),
    request_body = RatesRequest,
    tag = "rates",
    responses(
        (status = 200, description = "Rates keyed by to -> from -> exchange"),
        (status = 400, description = "Invalid body")
    )
)]
#[instrument(skip(state, body), fields(granularity = %granularity, pairs = body.pairs.len()))]
pub async fn rates_handler(
    Path(granularity): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<RatesRequest>,
) -> Result<Json<HistoResponse>, AppError> {
    let granularity = Granularity::from_str(&granularity)
        .map_err(|_| ClientError::new("granularity must be 'daily' or 'hourly'"))?;
    let request_pairs = validate_and_convert(granularity, body)?;

    metrics::counter!("api_requests_total", "endpoint" => "rates").increment(1);

    let result = state.read_service.get_histo(&request_pairs, granularity).await?;
    Ok(Json(result))
}

#[utoipa::path(
    get,
    path = "/exchanges/{from}/{to}",
    params(
        ("from" = String, Path, description = "Source ticker"),
        ("to" = String, Path, description = "Destination ticker")
    ),
    tag = "exchanges",
    responses(
        (status = 200, description = "Exchanges offering this pair"),
        (status = 400, description = "Unsupported ticker")
    )
)]
#[instrument(skip(state), fields(from = %from, to = %to))]
pub async fn exchanges_handler(
    Path((from, to)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let from_ticker = crate::domain::currency::Ticker::new(&from);
    let to_ticker = crate::domain::currency::Ticker::new(&to);
    if !state.registry.is_supported(&from_ticker) || !state.registry.is_supported(&to_ticker) {
        return Err(ClientError::new(format!("unsupported ticker in pair {from}/{to}")).into());
    }

    metrics::counter!("api_requests_total", "endpoint" => "exchanges").increment(1);

    let exchanges = state.read_service.get_exchanges(&from, &to).await?;
    Ok(Json(exchanges))
}

#[utoipa::path(
    get,
    path = "/tickers",
    tag = "tickers",
    responses((status = 200, description = "Ranked crypto tickers"))
)]
pub async fn tickers_handler(State(state): State<AppState>) -> Result<Json<Vec<String>>, AppError> {
    metrics::counter!("api_requests_total", "endpoint" => "tickers").increment(1);
    let tickers = state.read_service.get_daily_market_cap_coins().await?;
    Ok(Json(tickers))
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/_health",
    tag = "system",
    responses(
        (status = 200, description = "Store reachable", body = HealthResponse),
        (status = 503, description = "Store unreachable")
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.status_db().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "OK".to_string(),
                service: "database".to_string(),
                version: VERSION.to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "health check: store unreachable");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/_health/noop",
    tag = "system",
    responses((status = 200, description = "Process is alive"))
)]
pub async fn health_noop_handler() -> impl IntoResponse {
    StatusCode::OK
}

#[derive(Debug, Serialize, ToSchema, IntoParams)]
pub struct ServiceStatus {
    pub service: String,
    pub status: String,
}

#[utoipa::path(
    get,
    path = "/_health/detail",
    tag = "system",
    responses(
        (status = 200, description = "Per-service status", body = [ServiceStatus]),
        (status = 503, description = "Store unreachable")
    )
)]
pub async fn health_detail_handler(State(state): State<AppState>) -> impl IntoResponse {
    if let Err(e) = state.store.status_db().await {
        tracing::warn!(error = %e, "health detail: store unreachable");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let meta = match state.store.get_meta().await {
        Ok(meta) => meta,
        Err(e) => {
            tracing::warn!(error = %e, "health detail: failed to load meta");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    let now = Utc::now();
    let live_rates_status = if now - meta.last_live_rates_sync > LIVE_RATES_STALE_AFTER {
        "KO"
    } else {
        "OK"
    };
    let market_cap_status = if now - meta.last_market_cap_sync > MARKET_CAP_STALE_AFTER {
        "KO"
    } else {
        "OK"
    };

    let statuses = vec![
        ServiceStatus {
            service: "database".to_string(),
            status: "OK".to_string(),
        },
        ServiceStatus {
            service: "live-rates".to_string(),
            status: live_rates_status.to_string(),
        },
        ServiceStatus {
            service: "marketcap".to_string(),
            status: market_cap_status.to_string(),
        },
    ];

    Json(statuses).into_response()
}

#[utoipa::path(
    get,
    path = "/metrics",
    tag = "system",
    responses((status = 200, description = "Prometheus metrics", content_type = "text/plain"))
)]
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(from: &str, to: &str, exchange: Option<&str>) -> RatesPairRequest {
        RatesPairRequest {
            from: from.to_string(),
            to: to.to_string(),
            exchange: exchange.map(|e| e.to_string()),
            after: None,
            after_day: None,
            at: None,
        }
    }

    #[test]
    fn s6_rejects_duplicate_pairs() {
        let body = RatesRequest {
            pairs: vec![pair("BTC", "USD", None), pair("btc", "usd", None)],
        };
        let err = validate_and_convert(Granularity::Daily, body).unwrap_err();
        assert!(err.0.contains("duplicates"));
    }

    #[test]
    fn rejects_more_than_max_pairs() {
        let pairs = (0..MAX_PAIRS + 1).map(|i| pair("BTC", "USD", Some(&i.to_string()))).collect();
        let body = RatesRequest { pairs };
        assert!(validate_and_convert(Granularity::Daily, body).is_err());
    }

    #[test]
    fn after_day_rejected_for_hourly() {
        let mut p = pair("BTC", "USD", None);
        p.after_day = Some("2024-01-01".to_string());
        let body = RatesRequest { pairs: vec![p] };
        let err = validate_and_convert(Granularity::Hourly, body).unwrap_err();
        assert!(err.0.contains("afterDay"));
    }

    #[test]
    fn accepts_distinct_exchanges_for_same_pair() {
        let body = RatesRequest {
            pairs: vec![pair("BTC", "USD", Some("kraken")), pair("BTC", "USD", Some("binance"))],
        };
        assert!(validate_and_convert(Granularity::Daily, body).is_ok());
    }
}
