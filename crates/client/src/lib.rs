//! Staynest client core: the realtime notification synchronization hub.
//!
//! This crate multiplexes one live, authenticated WebSocket across an
//! arbitrary number of UI consumers, reconciles it with the persisted
//! notification history from the REST API, and keeps every consumer's view
//! eventually consistent under reconnects, credential expiry, and concurrent
//! read-state mutation. Rendering is out of scope; consumers observe the hub
//! through [`NotificationHub::subscribe`].

pub mod api_client;
pub mod auth;
pub mod logging;
pub mod notifications;
pub mod single_flight;
pub mod ws;

pub use api_client::ApiClient;
pub use auth::{CredentialProvider, SessionCredentials};
pub use notifications::{
    HubConfig, HubSubscription, NotificationHub, NotificationStore, SubscribeOptions,
    SESSION_EXPIRED,
};
pub use single_flight::SingleFlight;
pub use ws::{
    ConnectionState, ReconnectConfig, Transport, TransportEvent, UrlBuilder, WsHandle, WsLink,
    WsTransport,
};
