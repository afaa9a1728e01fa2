use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MESSAGE_PAGE_SIZE: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub room_id: String,
    pub sender_id: i64,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    pub fn new(room_id: String, sender_id: i64, content: String) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            room_id,
            sender_id,
            content,
            sent_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageQuery {
    pub page: Option<i64>,
    pub asc: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub page: i64,
    pub page_count: i64,
}

/// Pages needed for `total` messages at the fixed page size.
pub fn page_count(total: i64) -> i64 {
    (total + MESSAGE_PAGE_SIZE - 1) / MESSAGE_PAGE_SIZE
}
