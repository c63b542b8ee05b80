//! Shared HTTP plumbing for provider adapters: a client with sane
//! connect/request timeouts, and a rate-limit-aware exponential-backoff
//! retry loop (`execute_with_retry`/`check_rate_limit`) shared by every
//! REST adapter.

use crate::domain::error::ProviderError;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{info, warn};

pub fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .build()
        .expect("failed to build HTTP client")
}

fn check_rate_limit(resp: &Response) {
    if let Some(remaining) = resp.headers().get("x-ratelimit-remaining") {
        if let Ok(remaining_str) = remaining.to_str() {
            if let Ok(remaining_count) = remaining_str.parse::<u32>() {
                if remaining_count < 100 {
                    warn!(remaining = remaining_count, "provider rate limit low");
                }
            }
        }
    }
}

/// Execute `operation` with exponential backoff retry on 429/5xx,
/// capped at 5 attempts / 30s delay. Respects `Retry-After` when present.
pub async fn execute_with_retry<F, Fut>(mut operation: F) -> Result<Response, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<Response, reqwest::Error>>,
{
    let max_retries = 5;
    let mut delay_ms: u64 = 100;

    for attempt in 0..max_retries {
        let resp = operation()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        check_rate_limit(&resp);

        let status = resp.status().as_u16();
        let retryable = status == 429 || (500..600).contains(&status);
        if retryable && attempt < max_retries - 1 {
            let wait_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(delay_ms / 1000);
            warn!(attempt = attempt + 1, max_retries, wait_secs, "provider rate limited, retrying");
            tokio::time::sleep(Duration::from_secs(wait_secs.max(1))).await;
            delay_ms = (delay_ms * 2).min(30_000);
            continue;
        }

        if !resp.status().is_success() {
            return Err(ProviderError::Transient(format!(
                "provider HTTP error: {}",
                resp.status()
            )));
        }

        info!(attempt = attempt + 1, "provider request succeeded");
        return Ok(resp);
    }

    Err(ProviderError::Transient(format!(
        "provider request failed after {max_retries} retries"
    )))
}
