//! Shared data models for the Staynest marketplace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single user-facing notification. The `id` is the dedup key across the
/// combined live + persisted view; `kind` is an opaque category tag that
/// consumers branch on (e.g. `host_verification_approved`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    /// Opaque payload consumers may branch on (booking id, listing id, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Notification {
    /// Construct an unread notification with the current timestamp.
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            title: title.into(),
            message: message.into(),
            read: false,
            created_at: Utc::now(),
            metadata: None,
        }
    }
}

/// Name of the per-user logical channel that notification events are
/// routed through. The server only delivers to joined channels.
pub fn notification_channel(user_id: &str) -> String {
    format!("notifications:{}", user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_serializes_camel_case() {
        let n = Notification::new("n1", "booking_confirmed", "Booking confirmed", "Enjoy!");
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "booking_confirmed");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("metadata").is_none());
        assert_eq!(json["read"], false);
    }

    #[test]
    fn notification_roundtrips_metadata() {
        let mut n = Notification::new("n2", "new_message", "New message", "Hi");
        n.metadata = Some(serde_json::json!({ "listingId": "l-9" }));
        let text = serde_json::to_string(&n).unwrap();
        let back: Notification = serde_json::from_str(&text).unwrap();
        assert_eq!(back, n);
    }
}
