//! Connection manager: exactly one live transport for the whole process,
//! authenticated against the current user, self-healing on failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures_channel::mpsc::UnboundedReceiver;
use futures_util::StreamExt;
use staynest_shared::{notification_channel, ServerEvent, TransportError, WsEnvelope};

use super::registry::ListenerRegistry;
use super::store::NotificationStore;
use crate::auth::CredentialProvider;
use crate::ws::{ConnectionState, Transport, TransportEvent, UrlBuilder, WsHandle, WsLink};

/// Terminal error surfaced when a refreshed credential is still rejected, or
/// the refresh itself fails. No automatic retries follow.
pub const SESSION_EXPIRED: &str = "Session expired. Please log in again.";

/// Distinguished connect-rejection reason the server uses for expired
/// credentials.
const TOKEN_EXPIRED: &str = "Token expired";

pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    registry: Arc<ListenerRegistry>,
    store: Arc<Mutex<NotificationStore>>,
    /// WebSocket endpoint without the token query parameter.
    ws_url: String,
    state: Mutex<ConnectionState>,
    active: Mutex<Option<ActiveConnection>>,
    /// In-flight guard: a second `ensure_connected` arriving while a connect
    /// chain is running is dropped rather than racing it.
    connecting: AtomicBool,
    /// Self-reference handed to the event pump; the pump must not keep the
    /// manager alive on its own.
    weak: Weak<ConnectionManager>,
}

struct ActiveConnection {
    user_id: String,
    handle: WsHandle,
    pump: tokio::task::JoinHandle<()>,
}

impl ConnectionManager {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
        registry: Arc<ListenerRegistry>,
        store: Arc<Mutex<NotificationStore>>,
        ws_url: String,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            transport,
            credentials,
            registry,
            store,
            ws_url,
            state: Mutex::new(ConnectionState::Disconnected),
            active: Mutex::new(None),
            connecting: AtomicBool::new(false),
            weak: weak.clone(),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state.lock().unwrap().clone()
    }

    fn set_state(&self, next: ConnectionState) {
        *self.state.lock().unwrap() = next;
    }

    /// Idempotent: a healthy transport for the same user is reused, a stale
    /// one is torn down and replaced. Safe to call at any time. Failures are
    /// broadcast through the registry, never returned.
    pub async fn ensure_connected(&self, user_id: &str) {
        {
            let active = self.active.lock().unwrap();
            let reusable = active.as_ref().map_or(false, |conn| conn.user_id == user_id)
                && self.state().is_connected();
            if reusable {
                drop(active);
                self.registry.notify_connection(true);
                return;
            }
        }

        if self.connecting.swap(true, Ordering::SeqCst) {
            return;
        }
        self.connect_chain(user_id).await;
        self.connecting.store(false, Ordering::SeqCst);
    }

    /// One connect chain: open the transport with a fresh credential,
    /// refreshing at most once if the server rejects it as expired. A second
    /// rejection (or a failed refresh) fails closed with [`SESSION_EXPIRED`]
    /// instead of hammering the server.
    async fn connect_chain(&self, user_id: &str) {
        self.teardown();
        self.set_state(ConnectionState::Connecting);

        let mut refreshed = false;
        loop {
            if self.credentials.bearer_token().is_none() {
                if refreshed || self.credentials.refresh().await.is_err() {
                    self.fail("Not authenticated");
                    return;
                }
                refreshed = true;
                continue;
            }

            match self.transport.open(self.url_builder()).await {
                Ok(link) => {
                    self.install(user_id, link);
                    return;
                }
                Err(TransportError::Rejected { reason }) if reason.contains(TOKEN_EXPIRED) => {
                    if refreshed {
                        self.fail(SESSION_EXPIRED);
                        return;
                    }
                    tracing::info!("credential rejected ({}), refreshing once", reason);
                    refreshed = true;
                    if self.credentials.refresh().await.is_err() {
                        self.fail(SESSION_EXPIRED);
                        return;
                    }
                }
                Err(e) => {
                    self.set_state(ConnectionState::Failed {
                        reason: e.to_string(),
                    });
                    self.registry.notify_connection(false);
                    self.registry.notify_error(Some(e.to_string()));
                    return;
                }
            }
        }
    }

    fn install(&self, user_id: &str, link: WsLink) {
        let WsLink {
            handle,
            events,
            first_failure,
        } = link;

        let channel = notification_channel(user_id);
        if let Err(e) = handle.join_channel(&channel) {
            tracing::warn!("failed to join {}: {}", channel, e);
        }

        let pump = tokio::spawn(pump_events(
            self.weak.clone(),
            user_id.to_string(),
            events,
        ));
        *self.active.lock().unwrap() = Some(ActiveConnection {
            user_id: user_id.to_string(),
            handle,
            pump,
        });

        match first_failure {
            None => {
                self.set_state(ConnectionState::Connected);
                self.registry.notify_error(None);
                self.registry.notify_connection(true);
            }
            // The link opened in a retrying state: report the failure and let
            // the transport's backoff drive it up (the pump flips to
            // Connected on `Up`).
            Some(reason) => {
                tracing::warn!("transport opened retrying: {}", reason);
                self.set_state(ConnectionState::Reconnecting { attempt: 0 });
                self.registry.notify_connection(false);
                self.registry.notify_error(Some(reason));
            }
        }
    }

    /// Tear down the singleton transport once the last subscriber is gone.
    /// No-op while any subscriber remains.
    pub fn release(&self) {
        if self.registry.subscriber_count() > 0 {
            return;
        }
        tracing::info!("last subscriber left, closing notification transport");
        self.teardown();
    }

    fn teardown(&self) {
        if let Some(conn) = self.active.lock().unwrap().take() {
            // Best-effort goodbye; the link may already be gone.
            let _ = conn.handle.leave_channel(&notification_channel(&conn.user_id));
            conn.handle.close();
            conn.pump.abort();
        }
        self.set_state(ConnectionState::Disconnected);
    }

    fn current_handle(&self) -> Option<WsHandle> {
        self.active
            .lock()
            .unwrap()
            .as_ref()
            .map(|conn| conn.handle.clone())
    }

    fn url_builder(&self) -> UrlBuilder {
        let credentials = self.credentials.clone();
        let ws_url = self.ws_url.clone();
        Arc::new(move || {
            let token = credentials.bearer_token()?;
            Some(format!("{}?token={}", ws_url, urlencoding::encode(&token)))
        })
    }

    fn dispatch(&self, envelope: WsEnvelope<ServerEvent>, user_id: &str) {
        match envelope.payload {
            ServerEvent::NewNotification { notification } => {
                let fresh = self.store.lock().unwrap().ingest(notification.clone());
                if fresh {
                    self.registry.notify_notification(&notification);
                } else {
                    tracing::debug!("duplicate notification {} discarded", notification.id);
                }
            }
            ServerEvent::NotificationRead { user_id: target } => {
                if target == user_id {
                    self.store.lock().unwrap().mark_all_read_local();
                }
            }
        }
    }

    fn fail(&self, reason: &str) {
        self.set_state(ConnectionState::Failed {
            reason: reason.to_string(),
        });
        self.registry.notify_connection(false);
        self.registry.notify_error(Some(reason.to_string()));
    }
}

/// Dispatch transport events into the store and registry. Holds only a weak
/// reference so an abandoned manager can drop cleanly.
async fn pump_events(
    manager: Weak<ConnectionManager>,
    user_id: String,
    mut events: UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.next().await {
        let Some(manager) = manager.upgrade() else {
            return;
        };
        match event {
            TransportEvent::Up => {
                // The server only routes to joined channels; rejoin after
                // every reconnect.
                if let Some(handle) = manager.current_handle() {
                    let channel = notification_channel(&user_id);
                    if let Err(e) = handle.join_channel(&channel) {
                        tracing::warn!("failed to rejoin {}: {}", channel, e);
                    }
                }
                manager.set_state(ConnectionState::Connected);
                manager.registry.notify_error(None);
                manager.registry.notify_connection(true);
            }
            TransportEvent::Down => {
                manager.set_state(ConnectionState::Disconnected);
                manager.registry.notify_connection(false);
            }
            TransportEvent::ConnectFailed { attempt, reason } => {
                manager.set_state(ConnectionState::Reconnecting { attempt });
                manager.registry.notify_connection(false);
                manager.registry.notify_error(Some(reason));
            }
            TransportEvent::Lost { reason } => {
                manager.set_state(ConnectionState::Failed {
                    reason: reason.clone(),
                });
                manager.registry.notify_connection(false);
                manager.registry.notify_error(Some(reason));
                return;
            }
            TransportEvent::CredentialExpired { reason } => {
                tracing::info!("credential expired mid-session: {}", reason);
                manager.set_state(ConnectionState::Disconnected);
                manager.registry.notify_connection(false);
                // Restart the connect chain; the refresh-once rule applies
                // to the fresh chain.
                let uid = user_id.clone();
                tokio::spawn(async move { manager.ensure_connected(&uid).await });
                return;
            }
            TransportEvent::Event(envelope) => manager.dispatch(envelope, &user_id),
        }
    }
}
