use std::sync::Arc;

use chrono::Utc;
use common::{AppError, AppResult, Conflict, Forbidden};
use tracing::{error, info};

use super::NotificationService;
use crate::domain::{Consolidation, ConsolidationStatus, Transaction};
use crate::repo::Store;

/// Turns a room's bills into a minimal set of transfers and tracks their
/// settlement.
#[derive(Clone)]
pub struct SettlementService {
    store: Arc<dyn Store>,
    notifications: NotificationService,
}

impl SettlementService {
    pub fn new(store: Arc<dyn Store>, notifications: NotificationService) -> Self {
        Self {
            store,
            notifications,
        }
    }

    /// Consolidates every bill of the room in one unit of work. The room row
    /// stays locked until commit, so concurrent calls for the same room are
    /// serialised and the loser sees the room as already consolidated.
    pub async fn consolidate_room(&self, room_id: &str, caller_id: i64) -> AppResult<Consolidation> {
        let mut tx = self.store.begin().await?;

        let room = tx
            .lock_room(room_id)
            .await?
            .ok_or_else(|| AppError::not_found("room"))?;
        if !room.is_host(caller_id) {
            return Err(Forbidden::NotHost.into());
        }

        match tx.consolidation_status(room_id).await? {
            ConsolidationStatus::NoBills => return Err(AppError::invalid("room has no bills")),
            ConsolidationStatus::Consolidated => return Err(Conflict::AlreadyConsolidated.into()),
            ConsolidationStatus::Unconsolidated => {}
        }

        let consolidation = tx.insert_consolidation(room_id).await?;
        tx.assign_consolidation(room_id, consolidation.id).await?;

        let bills: Vec<_> = tx
            .bills_for_room(room_id)
            .await?
            .iter()
            .map(|bill| bill.to_split())
            .collect();
        let transfers = settlement::compute(&bills, consolidation.id);
        tx.insert_transactions(&transfers).await?;

        tx.commit().await?;

        info!(
            room_id,
            consolidation_id = consolidation.id,
            bills = bills.len(),
            transfers = transfers.len(),
            "Room consolidated"
        );
        Ok(consolidation)
    }

    /// Marks a transaction paid. Only its payer may do this, and only once.
    /// The payee is notified after the change is committed.
    pub async fn settle_transaction(&self, transaction_id: i64, caller_id: i64) -> AppResult<Transaction> {
        let mut tx = self.store.begin().await?;

        let mut transaction = tx
            .lock_transaction(transaction_id)
            .await?
            .ok_or_else(|| AppError::not_found("transaction"))?;
        if transaction.is_paid {
            return Err(Conflict::AlreadySettled.into());
        }
        if transaction.payer_id != caller_id {
            return Err(Forbidden::InvalidPayer.into());
        }

        let paid_at = Utc::now();
        tx.mark_paid(transaction_id, paid_at).await?;
        let username = tx
            .find_username(caller_id)
            .await?
            .unwrap_or_else(|| format!("user {}", caller_id));
        tx.commit().await?;

        transaction.is_paid = true;
        transaction.paid_at = Some(paid_at);
        info!(transaction_id, payer_id = caller_id, "Transaction settled");

        let content = format!("{} paid you ${:.2}!", username, transaction.amount);
        if let Err(e) = self
            .notifications
            .send_notification(transaction.payee_id, "Settled", &content)
            .await
        {
            error!(transaction_id, "Failed to notify payee: {}", e);
        }

        Ok(transaction)
    }

    pub async fn transactions_for_user(&self, user_id: i64, is_paid: bool) -> AppResult<Vec<Transaction>> {
        let mut tx = self.store.begin().await?;
        let transactions = tx.transactions_for_user(user_id, is_paid).await?;
        tx.commit().await?;
        Ok(transactions)
    }
}
