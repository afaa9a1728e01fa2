use std::collections::BTreeSet;
use std::sync::Arc;

use common::{AppError, AppResult, Conflict, Forbidden};
use rust_decimal::Decimal;
use tracing::info;

use crate::domain::{Bill, ConsolidationStatus, CreateBillRequest, NewBill};
use crate::repo::Store;

/// Largest accepted bill amount. Matches DECIMAL(12,2).
const MAX_AMOUNT: i64 = 9_999_999_999;

#[derive(Clone)]
pub struct BillService {
    store: Arc<dyn Store>,
}

impl BillService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_bill(&self, owner_id: i64, req: CreateBillRequest) -> AppResult<Bill> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::invalid("bill name is required"));
        }
        if req.amount.is_sign_negative() || req.amount.scale() > 2 {
            return Err(AppError::invalid(
                "amount must be non-negative with at most 2 decimal places",
            ));
        }
        if req.amount > Decimal::from(MAX_AMOUNT) {
            return Err(AppError::invalid("amount is too large"));
        }

        let payers: Vec<i64> = req.payers.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if payers.is_empty() {
            return Err(AppError::invalid("at least one payer is required"));
        }

        let mut tx = self.store.begin().await?;
        let room = tx
            .lock_room(&req.room_id)
            .await?
            .ok_or_else(|| AppError::not_found("room"))?;
        if room.is_closed {
            return Err(Conflict::RoomClosed.into());
        }
        if !tx.is_member(&room.id, owner_id).await? {
            return Err(Forbidden::NotInRoom.into());
        }
        if tx.existing_user_ids(&payers).await?.len() != payers.len() {
            return Err(AppError::not_found("payers"));
        }
        if tx.consolidation_status(&room.id).await? == ConsolidationStatus::Consolidated {
            return Err(Conflict::AlreadyConsolidated.into());
        }

        let bill = tx
            .insert_bill(&NewBill {
                room_id: room.id,
                owner_id,
                name,
                amount: req.amount,
                include_owner: req.include_owner,
                payers,
            })
            .await?;
        tx.commit().await?;

        info!(bill_id = bill.id, room_id = %bill.room_id, owner_id, "Bill created");
        Ok(bill)
    }

    pub async fn get_bills(&self, room_id: &str) -> AppResult<Vec<Bill>> {
        let mut tx = self.store.begin().await?;
        if tx.find_room(room_id).await?.is_none() {
            return Err(AppError::not_found("room"));
        }
        let bills = tx.bills_for_room(room_id).await?;
        tx.commit().await?;
        Ok(bills)
    }

    /// Removes every bill of a room that has not been consolidated yet.
    pub async fn delete_room_bills(&self, room_id: &str, caller_id: i64) -> AppResult<u64> {
        let mut tx = self.store.begin().await?;
        let room = tx
            .lock_room(room_id)
            .await?
            .ok_or_else(|| AppError::not_found("room"))?;
        if !room.is_host(caller_id) {
            return Err(Forbidden::NotHost.into());
        }
        if tx.consolidation_status(room_id).await? == ConsolidationStatus::Consolidated {
            return Err(Conflict::AlreadyConsolidated.into());
        }

        let deleted = tx.delete_room_bills(room_id).await?;
        tx.commit().await?;

        info!(room_id, deleted, "Room bills deleted");
        Ok(deleted)
    }

    pub async fn consolidation_status(&self, room_id: &str) -> AppResult<ConsolidationStatus> {
        let mut tx = self.store.begin().await?;
        if tx.find_room(room_id).await?.is_none() {
            return Err(AppError::not_found("room"));
        }
        let status = tx.consolidation_status(room_id).await?;
        tx.commit().await?;
        Ok(status)
    }

    pub async fn is_consolidated(&self, room_id: &str) -> AppResult<bool> {
        Ok(self.consolidation_status(room_id).await? == ConsolidationStatus::Consolidated)
    }
}
