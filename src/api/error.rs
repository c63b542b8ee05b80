//! HTTP boundary error mapping: composes the engine's typed taxonomy
//! into one `IntoResponse` impl, matching on the typed enum rather than
//! string-matching an opaque error.

use crate::domain::error::{ClientError, EngineError, ProviderError, StoreError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub enum AppError {
    Client(ClientError),
    Engine(EngineError),
}

impl From<ClientError> for AppError {
    fn from(e: ClientError) -> Self {
        AppError::Client(e)
    }
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        AppError::Engine(e)
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Engine(EngineError::Store(e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Client(e) => (StatusCode::BAD_REQUEST, e.0),
            AppError::Engine(EngineError::UnknownTicker(t)) => {
                (StatusCode::BAD_REQUEST, format!("unsupported ticker: {t}"))
            }
            AppError::Engine(EngineError::Provider(ProviderError::Config(e))) => {
                tracing::error!(error = %e, "config error surfaced at request time");
                (StatusCode::INTERNAL_SERVER_ERROR, "service misconfigured".to_string())
            }
            AppError::Engine(EngineError::Provider(e)) => {
                tracing::warn!(error = %e, "provider error serving request");
                (StatusCode::SERVICE_UNAVAILABLE, "upstream data source unavailable".to_string())
            }
            AppError::Engine(EngineError::Store(e)) => {
                tracing::error!(error = %e, "store error serving request");
                (StatusCode::SERVICE_UNAVAILABLE, "database unavailable".to_string())
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
