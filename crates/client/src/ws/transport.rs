//! Production WebSocket transport using tokio-tungstenite.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use staynest_shared::{
    try_error_message, ClientCommand, ServerEvent, TransportError, WsEnvelope,
};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{ReconnectConfig, Transport, TransportEvent, UrlBuilder, WsHandle, WsLink};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport with auto-reconnect and capped exponential backoff.
pub struct WsTransport {
    reconnect: ReconnectConfig,
}

impl WsTransport {
    pub fn new(reconnect: ReconnectConfig) -> Self {
        Self { reconnect }
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url_builder: UrlBuilder) -> Result<WsLink, TransportError> {
        let url = url_builder()
            .ok_or_else(|| TransportError::Connect("no connection URL available".into()))?;

        let (initial, first_failure) = match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                tracing::info!("WebSocket connected");
                (Some(stream), None)
            }
            Err(e) => {
                if let Some(reason) = rejection_reason(&e) {
                    return Err(TransportError::Rejected { reason });
                }
                tracing::warn!("WebSocket connect failed: {}", e);
                (None, Some(e.to_string()))
            }
        };

        let (cmd_tx, cmd_rx) = unbounded();
        let (event_tx, events) = unbounded();
        let handle = WsHandle::new(cmd_tx);
        let shutdown = handle.shutdown_flag();

        // One attempt is already consumed when the inline connect failed; the
        // caller learns about it through `first_failure`, not an event.
        let attempt = if first_failure.is_some() { 1 } else { 0 };

        tokio::spawn(run_loop(
            initial,
            url_builder,
            cmd_rx,
            event_tx,
            shutdown,
            self.reconnect.clone(),
            attempt,
        ));

        Ok(WsLink {
            handle,
            events,
            first_failure,
        })
    }
}

/// Connection management loop: reconnects with backoff until the handle is
/// closed, retries are exhausted, or a reconnect is rejected for credential
/// expiry (which the connection manager resolves, not this loop).
async fn run_loop(
    mut current: Option<WsStream>,
    url_builder: UrlBuilder,
    mut cmd_rx: UnboundedReceiver<WsEnvelope<ClientCommand>>,
    event_tx: UnboundedSender<TransportEvent>,
    shutdown: Arc<AtomicBool>,
    config: ReconnectConfig,
    mut attempt: u32,
) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }

        let stream = match current.take() {
            Some(stream) => stream,
            None => {
                if attempt > 0 {
                    let delay = config.delay_for_attempt(attempt - 1);
                    tracing::info!("reconnecting in {}ms (attempt {})", delay, attempt);
                    tokio::time::sleep(Duration::from_millis(delay as u64)).await;
                    if shutdown.load(Ordering::SeqCst) {
                        return;
                    }
                }

                let Some(url) = url_builder() else {
                    let _ = event_tx.unbounded_send(TransportEvent::ConnectFailed {
                        attempt,
                        reason: "no connection URL available".into(),
                    });
                    attempt += 1;
                    if config.max_attempts > 0 && attempt > config.max_attempts {
                        let _ = event_tx.unbounded_send(exhausted(&config));
                        return;
                    }
                    continue;
                };

                match connect_async(url.as_str()).await {
                    Ok((stream, _response)) => {
                        tracing::info!("WebSocket reconnected");
                        let _ = event_tx.unbounded_send(TransportEvent::Up);
                        attempt = 0;
                        stream
                    }
                    Err(e) => {
                        if let Some(reason) = rejection_reason(&e) {
                            let _ = event_tx
                                .unbounded_send(TransportEvent::CredentialExpired { reason });
                            return;
                        }
                        let _ = event_tx.unbounded_send(TransportEvent::ConnectFailed {
                            attempt,
                            reason: e.to_string(),
                        });
                        attempt += 1;
                        if config.max_attempts > 0 && attempt > config.max_attempts {
                            let _ = event_tx.unbounded_send(exhausted(&config));
                            return;
                        }
                        continue;
                    }
                }
            }
        };

        let (mut write, mut read) = stream.split();

        loop {
            tokio::select! {
                incoming = read.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WsEnvelope<ServerEvent>>(text.as_str()) {
                            Ok(envelope) => {
                                let _ = event_tx.unbounded_send(TransportEvent::Event(envelope));
                            }
                            Err(e) => tracing::error!("failed to parse server event: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!("WebSocket received close frame: {:?}", frame);
                        break;
                    }
                    // Pong is handled automatically by tungstenite.
                    Some(Ok(Message::Ping(_))) => {}
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket read error: {}", e);
                        break;
                    }
                    None => break,
                },
                outgoing = cmd_rx.next() => match outgoing {
                    Some(envelope) => match serde_json::to_string(&envelope) {
                        Ok(json) => {
                            if let Err(e) = write.send(Message::text(json)).await {
                                tracing::error!("WebSocket send failed: {}", e);
                                break;
                            }
                        }
                        Err(e) => tracing::error!("failed to serialize command: {}", e),
                    },
                    None => {
                        // Handle closed: say goodbye and stop for good.
                        let _ = write.send(Message::Close(None)).await;
                        return;
                    }
                },
            }
        }

        let _ = event_tx.unbounded_send(TransportEvent::Down);
    }
}

fn exhausted(config: &ReconnectConfig) -> TransportEvent {
    TransportEvent::Lost {
        reason: format!(
            "Max reconnect attempts ({}) exceeded",
            config.max_attempts
        ),
    }
}

/// Map an HTTP 401 handshake response to its rejection reason. The server
/// reports credential expiry in the body (`{"message":"Token expired"}`); a
/// bare 401 is treated as expiry too.
fn rejection_reason(err: &tungstenite::Error) -> Option<String> {
    if let tungstenite::Error::Http(response) = err {
        if response.status().as_u16() == 401 {
            let body = response
                .body()
                .as_ref()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_default();
            if let Some(message) = try_error_message(&body) {
                return Some(message);
            }
            if !body.trim().is_empty() {
                return Some(body.trim().to_string());
            }
            return Some("Token expired".to_string());
        }
    }
    None
}
