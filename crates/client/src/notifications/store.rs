//! Shared notification store: the single source of truth for what
//! notifications exist and which are read.
//!
//! All mutations are synchronous; the store is wrapped in a mutex by the hub
//! and never held across an await point. Snapshots are copy-on-write: the
//! same `Arc` is returned until content actually changes, so consumers can
//! skip re-renders with a pointer comparison.

use std::collections::HashSet;
use std::sync::Arc;

use staynest_shared::Notification;

#[derive(Default)]
pub struct NotificationStore {
    /// Ordered newest-first; live arrivals are prepended.
    items: Arc<Vec<Notification>>,
    /// Dedup index over `items`.
    ids: HashSet<String>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a live-pushed notification. Returns `false` (and discards the
    /// incoming copy) when a notification with the same id is already
    /// present; the caller uses the result to decide whether to fire
    /// notification listeners.
    pub fn ingest(&mut self, notification: Notification) -> bool {
        if self.ids.contains(&notification.id) {
            return false;
        }
        self.ids.insert(notification.id.clone());
        Arc::make_mut(&mut self.items).insert(0, notification);
        true
    }

    /// Flip every stored notification to read. Monotonic: nothing ever
    /// transitions back to unread. Returns whether anything changed.
    pub fn mark_all_read_local(&mut self) -> bool {
        if self.items.iter().all(|n| n.read) {
            return false;
        }
        for n in Arc::make_mut(&mut self.items).iter_mut() {
            n.read = true;
        }
        true
    }

    /// Merge a freshly-fetched persisted history into the store. Live
    /// entries keep their position; persisted entries not already present by
    /// id are appended in their fetched order. A notification seen both live
    /// and in the history therefore shows once, at its live-arrival position.
    /// Returns whether anything was added.
    pub fn merge_with_persisted(&mut self, persisted: Vec<Notification>) -> bool {
        let fresh: Vec<Notification> = persisted
            .into_iter()
            .filter(|n| !self.ids.contains(&n.id))
            .collect();
        if fresh.is_empty() {
            return false;
        }
        let items = Arc::make_mut(&mut self.items);
        for n in fresh {
            self.ids.insert(n.id.clone());
            items.push(n);
        }
        true
    }

    /// Current ordered view. The returned `Arc` is pointer-equal to the
    /// previous snapshot as long as content has not changed.
    pub fn snapshot(&self) -> Arc<Vec<Notification>> {
        self.items.clone()
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|n| !n.read).count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notif(id: &str) -> Notification {
        Notification::new(id, "booking_request", "Booking request", "A guest wants to book.")
    }

    #[test]
    fn ingest_is_idempotent_by_id() {
        let mut store = NotificationStore::new();
        assert!(store.ingest(notif("a")));
        assert!(!store.ingest(notif("a")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn live_arrivals_prepend() {
        let mut store = NotificationStore::new();
        store.ingest(notif("a"));
        store.ingest(notif("b"));
        let ids: Vec<_> = store.snapshot().iter().map(|n| n.id.clone()).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn merge_keeps_live_positions_and_appends_the_rest() {
        let mut store = NotificationStore::new();
        store.ingest(notif("a"));
        store.ingest(notif("b")); // live order: [b, a]

        store.merge_with_persisted(vec![notif("c"), notif("b"), notif("a")]);
        let ids: Vec<_> = store.snapshot().iter().map(|n| n.id.clone()).collect();
        assert_eq!(ids, ["b", "a", "c"]);
    }

    #[test]
    fn read_state_is_monotonic() {
        let mut store = NotificationStore::new();
        store.ingest(notif("a"));
        assert_eq!(store.unread_count(), 1);
        assert!(store.mark_all_read_local());
        assert_eq!(store.unread_count(), 0);

        // A duplicate of an already-read notification cannot un-read it,
        // arriving live or via the persisted history.
        assert!(!store.ingest(notif("a")));
        store.merge_with_persisted(vec![notif("a")]);
        assert_eq!(store.unread_count(), 0);

        // Persisted-only entries keep their own read flag.
        let mut read_one = notif("d");
        read_one.read = true;
        store.merge_with_persisted(vec![read_one]);
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn snapshot_is_stable_until_content_changes() {
        let mut store = NotificationStore::new();
        store.ingest(notif("a"));
        let before = store.snapshot();

        // No-op mutations return the same Arc.
        assert!(!store.ingest(notif("a")));
        assert!(!store.merge_with_persisted(vec![notif("a")]));
        assert!(Arc::ptr_eq(&before, &store.snapshot()));

        store.ingest(notif("b"));
        assert!(!Arc::ptr_eq(&before, &store.snapshot()));

        // Marking everything read twice only changes the snapshot once.
        assert!(store.mark_all_read_local());
        let read_snapshot = store.snapshot();
        assert!(!store.mark_all_read_local());
        assert!(Arc::ptr_eq(&read_snapshot, &store.snapshot()));
    }
}
