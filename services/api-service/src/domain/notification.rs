use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub id: String,
    pub user_id: i64,
    pub endpoint: String,
    pub auth: String,
    pub p256dh: String,
}

impl PushSubscription {
    pub fn new(user_id: i64, endpoint: String, auth: String, p256dh: String) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            user_id,
            endpoint,
            auth,
            p256dh,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub endpoint: String,
    pub auth: String,
    pub p256dh: String,
}
