//! WebSocket wire protocol between the Staynest client and provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Notification;

/// Envelope wrapping every WebSocket frame in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsEnvelope<T> {
    pub id: String,
    #[serde(flatten)]
    pub payload: T,
    pub ts: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl<T> WsEnvelope<T> {
    /// Wrap a payload in a fresh envelope.
    pub fn new(payload: T) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            ts: Utc::now(),
            correlation_id: None,
        }
    }
}

/// Commands sent from the client to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientCommand {
    /// Join a logical channel (e.g. `notifications:{user_id}`). The server
    /// routes events only to joined channels.
    JoinChannel { channel: String },
    /// Leave a previously joined channel.
    LeaveChannel { channel: String },
}

/// Events pushed from the provider to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// A new notification for the joined user channel.
    NewNotification { notification: Notification },
    /// Another client (or the server) marked all of this user's
    /// notifications read.
    #[serde(rename_all = "camelCase")]
    NotificationRead { user_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_command_wire_shape() {
        let env = WsEnvelope::new(ClientCommand::JoinChannel {
            channel: "notifications:u1".into(),
        });
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "joinChannel");
        assert_eq!(json["data"]["channel"], "notifications:u1");
        assert!(json.get("ts").is_some());
        assert!(json.get("correlationId").is_none());
    }

    #[test]
    fn server_event_parses_new_notification() {
        let text = r#"{
            "id": "e-1",
            "type": "newNotification",
            "data": { "notification": {
                "id": "n-1",
                "type": "host_verification_approved",
                "title": "You are verified",
                "message": "Your host account was approved.",
                "read": false,
                "createdAt": "2026-08-01T12:00:00Z"
            }},
            "ts": "2026-08-01T12:00:01Z"
        }"#;
        let env: WsEnvelope<ServerEvent> = serde_json::from_str(text).unwrap();
        match env.payload {
            ServerEvent::NewNotification { notification } => {
                assert_eq!(notification.id, "n-1");
                assert_eq!(notification.kind, "host_verification_approved");
                assert!(!notification.read);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn server_event_parses_notification_read() {
        let text = r#"{"id":"e-2","type":"notificationRead","data":{"userId":"u1"},"ts":"2026-08-01T12:00:02Z"}"#;
        let env: WsEnvelope<ServerEvent> = serde_json::from_str(text).unwrap();
        match env.payload {
            ServerEvent::NotificationRead { user_id } => assert_eq!(user_id, "u1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
