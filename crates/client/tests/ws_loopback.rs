//! End-to-end over a real WebSocket: the hub connects to a local
//! tokio-tungstenite accept loop, joins its channel, and receives a pushed
//! notification.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use staynest_client::{
    ConnectionState, CredentialProvider, HubConfig, NotificationHub, SubscribeOptions,
};
use staynest_shared::{AuthError, ClientCommand, Notification, ServerEvent, WsEnvelope};
use tokio_tungstenite::tungstenite::Message;

struct StaticToken(&'static str);

#[async_trait]
impl CredentialProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        Some(self.0.to_string())
    }

    async fn refresh(&self) -> Result<String, AuthError> {
        Err(AuthError::Refresh("static token".into()))
    }
}

#[tokio::test]
async fn hub_receives_live_notification_over_websocket() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen_channel = Arc::new(Mutex::new(None::<String>));

    let server = {
        let seen_channel = seen_channel.clone();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            // First frame must be the channel join.
            let frame = ws.next().await.unwrap().unwrap();
            let env: WsEnvelope<ClientCommand> =
                serde_json::from_str(frame.to_text().unwrap()).unwrap();
            match env.payload {
                ClientCommand::JoinChannel { channel } => {
                    *seen_channel.lock().unwrap() = Some(channel);
                }
                other => panic!("expected join, got {:?}", other),
            }

            // Push one notification, then wait for the client to hang up.
            let event = WsEnvelope::new(ServerEvent::NewNotification {
                notification: Notification::new(
                    "n-live",
                    "booking_confirmed",
                    "Booking confirmed",
                    "Your stay is booked.",
                ),
            });
            ws.send(Message::text(serde_json::to_string(&event).unwrap()))
                .await
                .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        })
    };

    let hub = NotificationHub::with_ws_transport(
        HubConfig::new(format!("http://{addr}")),
        Arc::new(StaticToken("loopback-token")),
    );
    let sub = hub.subscribe("u1", SubscribeOptions::default()).await;
    assert!(sub.is_connected());

    let mut tries = 0;
    while sub.notifications().is_empty() && tries < 100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        tries += 1;
    }
    let view = sub.notifications();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].id, "n-live");
    assert_eq!(sub.unread_count(), 1);
    assert_eq!(
        seen_channel.lock().unwrap().as_deref(),
        Some("notifications:u1")
    );

    sub.unsubscribe();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server task should end once the client hangs up")
        .unwrap();
}

#[tokio::test]
async fn refused_connect_reports_disconnected_with_error() {
    // Grab a free port, then close the listener so connects are refused.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let hub = NotificationHub::with_ws_transport(
        HubConfig::new(format!("http://{addr}")),
        Arc::new(StaticToken("loopback-token")),
    );
    let sub = hub.subscribe("u1", SubscribeOptions::default()).await;

    // No server exists, so the consumer must not observe a healthy
    // connection; the failure reason is surfaced while the transport's
    // backoff keeps retrying in the background.
    assert!(!sub.is_connected());
    assert!(sub.error().is_some());
    assert_eq!(
        hub.connection_state(),
        ConnectionState::Reconnecting { attempt: 0 }
    );
}
