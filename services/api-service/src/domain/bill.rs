use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use settlement::SplitBill;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: i64,
    pub room_id: String,
    pub owner_id: i64,
    pub name: String,
    pub amount: Decimal,
    pub include_owner: bool,
    pub payers: Vec<i64>,
    pub consolidation_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Bill {
    pub fn to_split(&self) -> SplitBill {
        SplitBill {
            owner_id: self.owner_id,
            amount: self.amount,
            payers: self.payers.clone(),
            include_owner: self.include_owner,
        }
    }
}

/// A validated bill ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBill {
    pub room_id: String,
    pub owner_id: i64,
    pub name: String,
    pub amount: Decimal,
    pub include_owner: bool,
    pub payers: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBillRequest {
    pub room_id: String,
    pub name: String,
    pub amount: Decimal,
    #[serde(default)]
    pub include_owner: bool,
    pub payers: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomQuery {
    pub room_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidateRequest {
    pub room_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsolidationStatus {
    NoBills,
    Unconsolidated,
    Consolidated,
}

impl ConsolidationStatus {
    /// `total` bills in the room, `consolidated` of which carry a consolidation id.
    pub fn from_counts(total: i64, consolidated: i64) -> Self {
        if total == 0 {
            ConsolidationStatus::NoBills
        } else if consolidated > 0 {
            ConsolidationStatus::Consolidated
        } else {
            ConsolidationStatus::Unconsolidated
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Consolidation {
    pub id: i64,
    pub room_id: String,
    pub created_at: DateTime<Utc>,
}
