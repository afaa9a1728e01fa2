use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use common::AppResult;
use sqlx::{MySql, QueryBuilder, Row};

use super::mysql::MySqlTx;
use crate::domain::{Bill, Consolidation, ConsolidationStatus, NewBill};

#[async_trait]
pub trait BillRepository {
    async fn insert_bill(&mut self, bill: &NewBill) -> AppResult<Bill>;

    /// Bills of a room with their payer sets, ordered by id.
    async fn bills_for_room(&mut self, room_id: &str) -> AppResult<Vec<Bill>>;

    async fn delete_room_bills(&mut self, room_id: &str) -> AppResult<u64>;

    async fn consolidation_status(&mut self, room_id: &str) -> AppResult<ConsolidationStatus>;

    async fn insert_consolidation(&mut self, room_id: &str) -> AppResult<Consolidation>;

    /// Stamps every bill of the room with `consolidation_id`.
    async fn assign_consolidation(&mut self, room_id: &str, consolidation_id: i64) -> AppResult<u64>;
}

#[async_trait]
impl BillRepository for MySqlTx {
    async fn insert_bill(&mut self, bill: &NewBill) -> AppResult<Bill> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO bills (room_id, owner_id, name, amount, include_owner, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&bill.room_id)
        .bind(bill.owner_id)
        .bind(&bill.name)
        .bind(bill.amount)
        .bind(bill.include_owner)
        .bind(created_at)
        .execute(&mut *self.tx)
        .await?;
        let bill_id = result.last_insert_id() as i64;

        let mut payers: QueryBuilder<MySql> =
            QueryBuilder::new("INSERT INTO bill_payers (bill_id, user_id) ");
        payers.push_values(&bill.payers, |mut row, user_id| {
            row.push_bind(bill_id).push_bind(*user_id);
        });
        payers.build().execute(&mut *self.tx).await?;

        Ok(Bill {
            id: bill_id,
            room_id: bill.room_id.clone(),
            owner_id: bill.owner_id,
            name: bill.name.clone(),
            amount: bill.amount,
            include_owner: bill.include_owner,
            payers: bill.payers.clone(),
            consolidation_id: None,
            created_at,
        })
    }

    async fn bills_for_room(&mut self, room_id: &str) -> AppResult<Vec<Bill>> {
        let rows = sqlx::query(
            r#"
            SELECT id, room_id, owner_id, name, amount, include_owner, consolidation_id, created_at
            FROM bills
            WHERE room_id = ?
            ORDER BY id
            "#,
        )
        .bind(room_id)
        .fetch_all(&mut *self.tx)
        .await?;

        let payer_rows = sqlx::query(
            r#"
            SELECT p.bill_id, p.user_id
            FROM bill_payers p
            INNER JOIN bills b ON b.id = p.bill_id
            WHERE b.room_id = ?
            ORDER BY p.bill_id, p.user_id
            "#,
        )
        .bind(room_id)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut payers: HashMap<i64, Vec<i64>> = HashMap::new();
        for row in &payer_rows {
            payers
                .entry(row.get("bill_id"))
                .or_default()
                .push(row.get("user_id"));
        }

        Ok(rows
            .iter()
            .map(|row| {
                let id: i64 = row.get("id");
                Bill {
                    id,
                    room_id: row.get("room_id"),
                    owner_id: row.get("owner_id"),
                    name: row.get("name"),
                    amount: row.get("amount"),
                    include_owner: row.get("include_owner"),
                    payers: payers.remove(&id).unwrap_or_default(),
                    consolidation_id: row.get("consolidation_id"),
                    created_at: row.get("created_at"),
                }
            })
            .collect())
    }

    async fn delete_room_bills(&mut self, room_id: &str) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM bills WHERE room_id = ?")
            .bind(room_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn consolidation_status(&mut self, room_id: &str) -> AppResult<ConsolidationStatus> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total, COUNT(consolidation_id) AS consolidated
            FROM bills
            WHERE room_id = ?
            FOR SHARE
            "#,
        )
        .bind(room_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(ConsolidationStatus::from_counts(
            row.get("total"),
            row.get("consolidated"),
        ))
    }

    async fn insert_consolidation(&mut self, room_id: &str) -> AppResult<Consolidation> {
        let created_at = Utc::now();
        let result = sqlx::query("INSERT INTO consolidations (room_id, created_at) VALUES (?, ?)")
            .bind(room_id)
            .bind(created_at)
            .execute(&mut *self.tx)
            .await?;

        Ok(Consolidation {
            id: result.last_insert_id() as i64,
            room_id: room_id.to_string(),
            created_at,
        })
    }

    async fn assign_consolidation(&mut self, room_id: &str, consolidation_id: i64) -> AppResult<u64> {
        let result = sqlx::query("UPDATE bills SET consolidation_id = ? WHERE room_id = ?")
            .bind(consolidation_id)
            .bind(room_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }
}
