use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ROOM_PAGE_SIZE: i64 = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    pub host_id: i64,
    pub is_private: bool,
    pub is_closed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    pub fn new(name: String, host_id: i64, is_private: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            name,
            host_id,
            is_private,
            is_closed: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_host(&self, user_id: i64) -> bool {
        self.host_id == user_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMember {
    pub user_id: i64,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default = "default_private")]
    pub is_private: bool,
    #[serde(default)]
    pub invitees: Vec<i64>,
}

fn default_private() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    #[serde(flatten)]
    pub room: Room,
    pub members: Vec<RoomMember>,
}
