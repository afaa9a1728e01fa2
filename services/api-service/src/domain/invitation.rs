use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Rejected,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Accepted => "accepted",
            InviteStatus::Rejected => "rejected",
        }
    }
}

impl From<String> for InviteStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "accepted" => InviteStatus::Accepted,
            "rejected" => InviteStatus::Rejected,
            _ => InviteStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    pub id: i64,
    pub room_id: String,
    pub user_id: i64,
    pub inviter_id: i64,
    pub status: InviteStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteUsersRequest {
    pub invitees: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondInviteRequest {
    pub accept: bool,
}
