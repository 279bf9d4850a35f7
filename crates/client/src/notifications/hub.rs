//! Hub facade: the per-consumer entry point that hides the singleton
//! plumbing behind a subscribe/unsubscribe contract.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use staynest_shared::{ApiError, Notification};

use super::manager::ConnectionManager;
use super::registry::{ListenerId, ListenerRegistry, NotificationListener};
use super::store::NotificationStore;
use crate::api_client::ApiClient;
use crate::auth::CredentialProvider;
use crate::ws::{ConnectionState, ReconnectConfig, Transport, WsTransport};

/// Configuration for a notification hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// HTTP base of the Staynest API, e.g. `https://staynest.example`.
    pub api_base_url: String,
    /// Path of the notification WebSocket endpoint.
    pub ws_path: String,
    pub reconnect: ReconnectConfig,
}

impl HubConfig {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ws_path: "/api/ws/notifications".to_string(),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// WebSocket endpoint URL derived from the HTTP base (http→ws, https→wss).
    pub fn ws_url(&self) -> String {
        let base = self.api_base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("ws://{base}")
        };
        let path = self.ws_path.trim_start_matches('/');
        format!("{ws_base}/{path}")
    }
}

/// Per-consumer subscription options.
#[derive(Default)]
pub struct SubscribeOptions {
    /// Push-style side-effect hook, invoked once per newly-arrived
    /// (non-duplicate) notification, in addition to the store update.
    pub on_notification: Option<NotificationListener>,
}

/// Process-wide notification hub: construct once at app start, hand clones
/// to every consumer. All clones share one registry, one store, and at most
/// one live transport.
#[derive(Clone)]
pub struct NotificationHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    api: ApiClient,
    registry: Arc<ListenerRegistry>,
    store: Arc<Mutex<NotificationStore>>,
    manager: Arc<ConnectionManager>,
}

impl NotificationHub {
    pub fn new(
        config: HubConfig,
        credentials: Arc<dyn CredentialProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let registry = Arc::new(ListenerRegistry::new());
        let store = Arc::new(Mutex::new(NotificationStore::new()));
        let api = ApiClient::new()
            .with_base_url(config.api_base_url.clone())
            .with_credentials(credentials.clone());
        let manager = ConnectionManager::new(
            transport,
            credentials,
            registry.clone(),
            store.clone(),
            config.ws_url(),
        );
        Self {
            inner: Arc::new(HubInner {
                api,
                registry,
                store,
                manager,
            }),
        }
    }

    /// Production constructor wiring in the tokio-tungstenite transport.
    pub fn with_ws_transport(config: HubConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        let transport = Arc::new(WsTransport::new(config.reconnect.clone()));
        Self::new(config, credentials, transport)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.manager.state()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.subscriber_count()
    }

    /// Join the hub: register this consumer's listeners and make sure the
    /// shared transport is up. The first subscriber opens the connection;
    /// later ones reuse it.
    pub async fn subscribe(&self, user_id: &str, options: SubscribeOptions) -> HubSubscription {
        let alive = Arc::new(AtomicBool::new(true));
        let connected = Arc::new(AtomicBool::new(false));
        let error = Arc::new(Mutex::new(None::<String>));

        // Every listener checks the liveness flag first: once a consumer
        // unsubscribes, late completions of in-flight operations must not
        // call back into it.
        let conn_id = {
            let alive = alive.clone();
            let connected = connected.clone();
            self.inner
                .registry
                .add_connection_listener(Arc::new(move |up| {
                    if alive.load(Ordering::SeqCst) {
                        connected.store(up, Ordering::SeqCst);
                    }
                }))
        };
        let err_id = {
            let alive = alive.clone();
            let error = error.clone();
            self.inner
                .registry
                .add_error_listener(Arc::new(move |e| {
                    if alive.load(Ordering::SeqCst) {
                        *error.lock().unwrap() = e;
                    }
                }))
        };
        let notif_id = options.on_notification.map(|callback| {
            let alive = alive.clone();
            self.inner
                .registry
                .add_notification_listener(Arc::new(move |n| {
                    if alive.load(Ordering::SeqCst) {
                        callback(n);
                    }
                }))
        });

        self.inner.manager.ensure_connected(user_id).await;

        HubSubscription {
            inner: self.inner.clone(),
            alive,
            connected,
            error,
            conn_id,
            err_id,
            notif_id,
            unsubscribed: AtomicBool::new(false),
        }
    }
}

/// A consumer's registration with the hub. Dropping it unsubscribes.
pub struct HubSubscription {
    inner: Arc<HubInner>,
    alive: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    error: Arc<Mutex<Option<String>>>,
    conn_id: ListenerId,
    err_id: ListenerId,
    notif_id: Option<ListenerId>,
    unsubscribed: AtomicBool,
}

impl HubSubscription {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Most recent error state, `None` while healthy.
    pub fn error(&self) -> Option<String> {
        self.error.lock().unwrap().clone()
    }

    /// The merged, deduplicated, newest-first notification view.
    pub fn notifications(&self) -> Arc<Vec<Notification>> {
        self.inner.store.lock().unwrap().snapshot()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.store.lock().unwrap().unread_count()
    }

    /// Fetch the persisted history and merge it into the shared store. Live
    /// entries keep their position; persisted-only entries append. Fetch
    /// failures do not affect the live connection's state.
    pub async fn refresh_history(&self) -> Result<Arc<Vec<Notification>>, ApiError> {
        let persisted = self.inner.api.fetch_notifications().await?;
        let mut store = self.inner.store.lock().unwrap();
        store.merge_with_persisted(persisted);
        Ok(store.snapshot())
    }

    /// Optimistically mark every notification read, then confirm remotely.
    /// The local flip is deliberately NOT rolled back if the remote call
    /// fails (responsiveness over strict consistency); the error is only
    /// reported to this caller.
    pub async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.inner.store.lock().unwrap().mark_all_read_local();
        self.inner.api.mark_all_read().await
    }

    /// Leave the hub. Effective immediately: no further callbacks reach this
    /// consumer, even from in-flight operations that complete later. The
    /// last consumer out closes the shared transport.
    pub fn unsubscribe(&self) {
        if self.unsubscribed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.alive.store(false, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);

        let registry = &self.inner.registry;
        registry.remove_connection_listener(self.conn_id);
        registry.remove_error_listener(self.err_id);
        if let Some(id) = self.notif_id {
            registry.remove_notification_listener(id);
        }
        self.inner.manager.release();
    }
}

impl Drop for HubSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
