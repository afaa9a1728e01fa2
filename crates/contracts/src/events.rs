use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Frames published to a user's topic and written verbatim to each of
/// that user's live sessions.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RealtimeEvent {
    Chat {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "senderId")]
        sender_id: i64,
        content: String,
        #[serde(rename = "sentAt")]
        sent_at: DateTime<Utc>,
        #[serde(rename = "messageId")]
        message_id: String,
    },
    Notification {
        #[serde(rename = "notificationId")]
        notification_id: i64,
        title: String,
        content: String,
        #[serde(rename = "createdAt")]
        created_at: DateTime<Utc>,
    },
}

impl RealtimeEvent {
    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_event_shape() {
        let event = RealtimeEvent::Chat {
            room_id: "r1".to_string(),
            sender_id: 3,
            content: "hi".to_string(),
            sent_at: Utc::now(),
            message_id: "m1".to_string(),
        };
        let json: serde_json::Value = serde_json::from_str(&event.to_payload().unwrap()).unwrap();

        assert_eq!(json["kind"], "chat");
        assert_eq!(json["roomId"], "r1");
        assert_eq!(json["senderId"], 3);
        assert_eq!(json["messageId"], "m1");
        assert!(json.get("sentAt").is_some());
    }

    #[test]
    fn test_notification_event_shape() {
        let event = RealtimeEvent::Notification {
            notification_id: 5,
            title: "Settled".to_string(),
            content: "bob paid you $5.00!".to_string(),
            created_at: Utc::now(),
        };
        let json: serde_json::Value = serde_json::from_str(&event.to_payload().unwrap()).unwrap();
        assert_eq!(json["kind"], "notification");
        assert_eq!(json["notificationId"], 5);
    }
}
