use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AppResult;
use settlement::Transfer;
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, QueryBuilder, Row};

use super::mysql::MySqlTx;
use crate::domain::Transaction;

#[async_trait]
pub trait TransactionRepository {
    async fn insert_transactions(&mut self, transfers: &[Transfer]) -> AppResult<()>;

    /// Loads a transaction and holds its row until the unit of work ends.
    async fn lock_transaction(&mut self, transaction_id: i64) -> AppResult<Option<Transaction>>;

    async fn mark_paid(&mut self, transaction_id: i64, paid_at: DateTime<Utc>) -> AppResult<()>;

    /// Transactions where the user is payer or payee.
    async fn transactions_for_user(&mut self, user_id: i64, is_paid: bool) -> AppResult<Vec<Transaction>>;
}

fn transaction_from_row(row: &MySqlRow) -> Transaction {
    Transaction {
        id: row.get("id"),
        consolidation_id: row.get("consolidation_id"),
        payer_id: row.get("payer_id"),
        payee_id: row.get("payee_id"),
        amount: row.get("amount"),
        is_paid: row.get("is_paid"),
        paid_at: row.get("paid_at"),
    }
}

#[async_trait]
impl TransactionRepository for MySqlTx {
    async fn insert_transactions(&mut self, transfers: &[Transfer]) -> AppResult<()> {
        if transfers.is_empty() {
            return Ok(());
        }

        let mut query: QueryBuilder<MySql> = QueryBuilder::new(
            "INSERT INTO transactions (consolidation_id, payer_id, payee_id, amount, is_paid) ",
        );
        query.push_values(transfers, |mut row, t| {
            row.push_bind(t.consolidation_id)
                .push_bind(t.payer_id)
                .push_bind(t.payee_id)
                .push_bind(t.amount)
                .push_bind(false);
        });
        query.build().execute(&mut *self.tx).await?;

        Ok(())
    }

    async fn lock_transaction(&mut self, transaction_id: i64) -> AppResult<Option<Transaction>> {
        let row = sqlx::query(
            r#"
            SELECT id, consolidation_id, payer_id, payee_id, amount, is_paid, paid_at
            FROM transactions
            WHERE id = ?
            FOR UPDATE
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(transaction_from_row))
    }

    async fn mark_paid(&mut self, transaction_id: i64, paid_at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query("UPDATE transactions SET is_paid = TRUE, paid_at = ? WHERE id = ?")
            .bind(paid_at)
            .bind(transaction_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn transactions_for_user(&mut self, user_id: i64, is_paid: bool) -> AppResult<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, consolidation_id, payer_id, payee_id, amount, is_paid, paid_at
            FROM transactions
            WHERE is_paid = ? AND (payer_id = ? OR payee_id = ?)
            ORDER BY id
            "#,
        )
        .bind(is_paid)
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.iter().map(transaction_from_row).collect())
    }
}
