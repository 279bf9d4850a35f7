//! The realtime notification synchronization hub.
//!
//! One live, authenticated WebSocket is multiplexed across any number of
//! independent UI consumers and reconciled with the persisted notification
//! history:
//!
//! ```text
//!   consumer ──┐                        ┌── CredentialProvider
//!   consumer ──┼── NotificationHub ─────┤
//!   consumer ──┘        │               └── ApiClient (history)
//!                       │
//!          ┌────────────┼────────────┐
//!   ListenerRegistry  NotificationStore  ConnectionManager ── Transport
//!      (fan-out)      (dedup + order)     (one live socket)
//! ```
//!
//! Consumers read the merged view from the store through their
//! [`HubSubscription`]; inbound events and connection state fan out through
//! the registry. The transport exists while at least one subscriber is
//! registered and is torn down when the last one leaves.

mod hub;
mod manager;
mod registry;
mod store;

pub use hub::{HubConfig, HubSubscription, NotificationHub, SubscribeOptions};
pub use manager::{ConnectionManager, SESSION_EXPIRED};
pub use registry::{
    ConnectionListener, ErrorListener, ListenerId, ListenerRegistry, NotificationListener,
};
pub use store::NotificationStore;
