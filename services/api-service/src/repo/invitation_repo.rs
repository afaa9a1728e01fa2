use async_trait::async_trait;
use common::AppResult;
use sqlx::mysql::MySqlRow;
use sqlx::Row;

use super::mysql::MySqlTx;
use crate::domain::{Invite, InviteStatus};

#[async_trait]
pub trait InvitationRepository {
    async fn insert_invite(&mut self, room_id: &str, user_id: i64, inviter_id: i64) -> AppResult<Invite>;

    async fn pending_invite(&mut self, room_id: &str, user_id: i64) -> AppResult<Option<Invite>>;

    async fn set_invite_status(&mut self, invite_id: i64, status: InviteStatus) -> AppResult<()>;

    /// Drops every pending invite of a room. Returns how many were dropped.
    async fn delete_pending_invites(&mut self, room_id: &str) -> AppResult<u64>;

    async fn pending_invites_for_user(&mut self, user_id: i64) -> AppResult<Vec<Invite>>;

    async fn count_pending_invites_for_user(&mut self, user_id: i64) -> AppResult<i64>;
}

fn invite_from_row(row: &MySqlRow) -> Invite {
    Invite {
        id: row.get("id"),
        room_id: row.get("room_id"),
        user_id: row.get("user_id"),
        inviter_id: row.get("inviter_id"),
        status: InviteStatus::from(row.get::<String, _>("status")),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl InvitationRepository for MySqlTx {
    async fn insert_invite(&mut self, room_id: &str, user_id: i64, inviter_id: i64) -> AppResult<Invite> {
        let created_at = chrono::Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO room_invites (room_id, user_id, inviter_id, status, created_at, updated_at)
            VALUES (?, ?, ?, 'pending', ?, ?)
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .bind(inviter_id)
        .bind(created_at)
        .bind(created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(Invite {
            id: result.last_insert_id() as i64,
            room_id: room_id.to_string(),
            user_id,
            inviter_id,
            status: InviteStatus::Pending,
            created_at,
        })
    }

    async fn pending_invite(&mut self, room_id: &str, user_id: i64) -> AppResult<Option<Invite>> {
        let row = sqlx::query(
            r#"
            SELECT id, room_id, user_id, inviter_id, status, created_at
            FROM room_invites
            WHERE room_id = ? AND user_id = ? AND status = 'pending'
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(invite_from_row))
    }

    async fn set_invite_status(&mut self, invite_id: i64, status: InviteStatus) -> AppResult<()> {
        sqlx::query("UPDATE room_invites SET status = ?, updated_at = NOW(6) WHERE id = ?")
            .bind(status.as_str())
            .bind(invite_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn delete_pending_invites(&mut self, room_id: &str) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM room_invites WHERE room_id = ? AND status = 'pending'")
            .bind(room_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn pending_invites_for_user(&mut self, user_id: i64) -> AppResult<Vec<Invite>> {
        let rows = sqlx::query(
            r#"
            SELECT id, room_id, user_id, inviter_id, status, created_at
            FROM room_invites
            WHERE user_id = ? AND status = 'pending'
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.iter().map(invite_from_row).collect())
    }

    async fn count_pending_invites_for_user(&mut self, user_id: i64) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM room_invites WHERE user_id = ? AND status = 'pending'",
        )
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count)
    }
}
