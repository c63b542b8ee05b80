//! Generic WebSocket subscription plumbing shared by the streaming
//! adapters. One background task owns the socket; `WsSubscription` is
//! the RAII handle the provider contract calls for -- dropping it or
//! calling `unsubscribe` closes the transport exactly once.

use crate::domain::error::ProviderError;
use crate::domain::model::PriceUpdate;
use crate::domain::provider::Subscription;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

#[derive(Deserialize)]
struct WireUpdate {
    symbol: String,
    price: f64,
}

pub struct WsSubscription {
    closed: Arc<AtomicBool>,
    close_tx: Option<mpsc::Sender<()>>,
}

#[async_trait]
impl Subscription for WsSubscription {
    async fn unsubscribe(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(()).await;
        }
    }
}

impl WsSubscription {
    /// Connects, optionally with a bearer token, and spawns the socket's
    /// owning task. The returned stream yields decoded price updates;
    /// malformed frames are logged and skipped rather than failing the
    /// whole subscription.
    pub async fn connect(
        url: &str,
        bearer: Option<String>,
    ) -> Result<(BoxStream<'static, PriceUpdate>, Box<dyn Subscription>), ProviderError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| ProviderError::Config(crate::domain::error::ConfigError::new(e.to_string())))?;
        if let Some(token) = bearer {
            let value = format!("Bearer {token}")
                .parse()
                .map_err(|_| ProviderError::Config(crate::domain::error::ConfigError::new("invalid bearer token")))?;
            request.headers_mut().insert("Authorization", value);
        }

        let (ws_stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let (out_tx, out_rx) = mpsc::channel::<PriceUpdate>(256);
        let (close_tx, mut close_rx) = mpsc::channel::<()>(1);
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = close_rx.recv() => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<WireUpdate>(&text) {
                                    Ok(update) => {
                                        let sent = out_tx
                                            .send(PriceUpdate {
                                                pair_exchange_id: update.symbol,
                                                price: update.price,
                                            })
                                            .await;
                                        if sent.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => warn!(error = %e, "unparseable live-price frame, skipping"),
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Err(e)) => {
                                warn!(error = %e, "websocket read error, closing subscription");
                                break;
                            }
                            _ => {}
                        }
                    }
                }
            }
        });

        let stream = ReceiverStream::new(out_rx).boxed();
        Ok((
            stream,
            Box::new(WsSubscription {
                closed,
                close_tx: Some(close_tx),
            }),
        ))
    }
}
