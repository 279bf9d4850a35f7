//! Live transport for realtime notification delivery.
//!
//! One authenticated WebSocket carries all notification traffic for the
//! process. The [`Transport`] trait is the seam between the connection
//! manager and the wire: production code uses [`WsTransport`]
//! (tokio-tungstenite with auto-reconnect); tests substitute a mock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_channel::mpsc::{UnboundedReceiver, UnboundedSender};
use staynest_shared::{ClientCommand, ServerEvent, TransportError, WsEnvelope};

mod transport;
pub use transport::WsTransport;

/// Connection state published by the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 1.5,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> u32 {
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(attempt as i32);
        (delay as u32).min(self.max_delay_ms)
    }
}

/// Events surfaced by a transport to the connection manager.
///
/// A link opened without [`WsLink::first_failure`] is already up; `Up` is
/// only emitted when a retrying link (re)connects.
#[derive(Debug)]
pub enum TransportEvent {
    /// The link came (back) up after a connect or reconnect attempt.
    Up,
    /// The link went down; the transport keeps retrying on its own.
    Down,
    /// A reconnect attempt failed; retry continues with backoff.
    ConnectFailed { attempt: u32, reason: String },
    /// A reconnect attempt was rejected for credential expiry. The loop has
    /// stopped; the connection manager owns the refresh-and-retry decision.
    CredentialExpired { reason: String },
    /// Retries are exhausted and the loop has stopped.
    Lost { reason: String },
    /// A server event arrived on the link.
    Event(WsEnvelope<ServerEvent>),
}

/// Handle for sending commands through a live transport.
#[derive(Clone)]
pub struct WsHandle {
    sender: UnboundedSender<WsEnvelope<ClientCommand>>,
    shutdown: Arc<AtomicBool>,
}

impl WsHandle {
    pub fn new(sender: UnboundedSender<WsEnvelope<ClientCommand>>) -> Self {
        Self {
            sender,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Send a command to the server
    pub fn send(&self, cmd: ClientCommand) -> Result<(), String> {
        self.sender
            .unbounded_send(WsEnvelope::new(cmd))
            .map_err(|e| format!("Failed to send: {}", e))
    }

    /// Join a logical channel
    pub fn join_channel(&self, channel: &str) -> Result<(), String> {
        self.send(ClientCommand::JoinChannel {
            channel: channel.to_string(),
        })
    }

    /// Leave a logical channel
    pub fn leave_channel(&self, channel: &str) -> Result<(), String> {
        self.send(ClientCommand::LeaveChannel {
            channel: channel.to_string(),
        })
    }

    /// Stop the reconnect loop and drop the socket. Idempotent.
    pub fn close(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.sender.close_channel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// A link: the command handle plus the inbound event stream.
pub struct WsLink {
    pub handle: WsHandle,
    pub events: UnboundedReceiver<TransportEvent>,
    /// Why the first connect attempt failed, when the link opened in a
    /// retrying state instead of live. `None` means the socket is up.
    pub first_failure: Option<String>,
}

/// Builds the connection URL, re-invoked on every (re)connect attempt so a
/// refreshed credential is picked up. Returns `None` when no credential is
/// available.
pub type UrlBuilder = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// The seam between the connection manager and the wire.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a link. The first connect attempt is awaited inline: a
    /// credential rejection surfaces as [`TransportError::Rejected`]; any
    /// other first-attempt failure yields a link carrying
    /// [`WsLink::first_failure`] whose internal loop keeps retrying with
    /// backoff, emitting [`TransportEvent::Up`] once it connects.
    async fn open(&self, url_builder: UrlBuilder) -> Result<WsLink, TransportError>;
}
