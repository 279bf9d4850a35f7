//! Listener registry: fan-out from the single connection to the many hub
//! consumers.
//!
//! Three independent listener tables (connection-state, error-state,
//! per-notification), keyed by listener id so registration is set-like.
//! Broadcast order across listeners is unspecified, and each invocation is
//! isolated with `catch_unwind` so one panicking consumer cannot prevent its
//! siblings from being notified.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use staynest_shared::Notification;

pub type ConnectionListener = Arc<dyn Fn(bool) + Send + Sync>;
pub type ErrorListener = Arc<dyn Fn(Option<String>) + Send + Sync>;
pub type NotificationListener = Arc<dyn Fn(&Notification) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    connection: Mutex<HashMap<ListenerId, ConnectionListener>>,
    error: Mutex<HashMap<ListenerId, ErrorListener>>,
    notification: Mutex<HashMap<ListenerId, NotificationListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Registration is set-like: re-adding an already-registered callback
    /// returns its existing id instead of making it fire twice per broadcast.
    fn insert<T: ?Sized>(
        &self,
        table: &Mutex<HashMap<ListenerId, Arc<T>>>,
        listener: Arc<T>,
    ) -> ListenerId {
        let mut table = table.lock().unwrap();
        if let Some(id) = table
            .iter()
            .find(|(_, existing)| Arc::ptr_eq(existing, &listener))
            .map(|(id, _)| *id)
        {
            return id;
        }
        let id = self.fresh_id();
        table.insert(id, listener);
        id
    }

    pub fn add_connection_listener(&self, listener: ConnectionListener) -> ListenerId {
        self.insert(&self.connection, listener)
    }

    pub fn remove_connection_listener(&self, id: ListenerId) {
        self.connection.lock().unwrap().remove(&id);
    }

    pub fn add_error_listener(&self, listener: ErrorListener) -> ListenerId {
        self.insert(&self.error, listener)
    }

    pub fn remove_error_listener(&self, id: ListenerId) {
        self.error.lock().unwrap().remove(&id);
    }

    pub fn add_notification_listener(&self, listener: NotificationListener) -> ListenerId {
        self.insert(&self.notification, listener)
    }

    pub fn remove_notification_listener(&self, id: ListenerId) {
        self.notification.lock().unwrap().remove(&id);
    }

    /// Number of registered hub consumers, derived from the
    /// connection-listener table (every consumer registers one).
    pub fn subscriber_count(&self) -> usize {
        self.connection.lock().unwrap().len()
    }

    pub fn notify_connection(&self, connected: bool) {
        for listener in self.snapshot(&self.connection) {
            if catch_unwind(AssertUnwindSafe(|| listener(connected))).is_err() {
                tracing::warn!("connection listener panicked during broadcast");
            }
        }
    }

    pub fn notify_error(&self, error: Option<String>) {
        for listener in self.snapshot(&self.error) {
            if catch_unwind(AssertUnwindSafe(|| listener(error.clone()))).is_err() {
                tracing::warn!("error listener panicked during broadcast");
            }
        }
    }

    pub fn notify_notification(&self, notification: &Notification) {
        for listener in self.snapshot(&self.notification) {
            if catch_unwind(AssertUnwindSafe(|| listener(notification))).is_err() {
                tracing::warn!("notification listener panicked during broadcast");
            }
        }
    }

    /// Clone the listeners out so callbacks run without the table lock held;
    /// a callback may itself register or unregister listeners.
    fn snapshot<T: Clone>(&self, table: &Mutex<HashMap<ListenerId, T>>) -> Vec<T> {
        table.lock().unwrap().values().cloned().collect()
    }
}
