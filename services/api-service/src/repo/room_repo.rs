use async_trait::async_trait;
use common::AppResult;
use sqlx::mysql::MySqlRow;
use sqlx::Row;

use super::mysql::MySqlTx;
use crate::domain::{Room, RoomMember};

#[async_trait]
pub trait RoomRepository {
    async fn insert_room(&mut self, room: &Room) -> AppResult<()>;

    async fn find_room(&mut self, room_id: &str) -> AppResult<Option<Room>>;

    /// Like `find_room`, but holds the room row until the unit of work ends.
    /// Every ledger or lifecycle write for a room goes through this lock.
    async fn lock_room(&mut self, room_id: &str) -> AppResult<Option<Room>>;

    async fn close_room(&mut self, room_id: &str) -> AppResult<()>;

    /// Open rooms of a user, most recently updated first.
    async fn rooms_for_user(&mut self, user_id: i64, offset: i64, limit: i64) -> AppResult<Vec<Room>>;

    async fn count_rooms_for_user(&mut self, user_id: i64) -> AppResult<i64>;

    async fn add_member(&mut self, room_id: &str, user_id: i64) -> AppResult<()>;

    async fn remove_member(&mut self, room_id: &str, user_id: i64) -> AppResult<bool>;

    async fn is_member(&mut self, room_id: &str, user_id: i64) -> AppResult<bool>;

    async fn member_ids(&mut self, room_id: &str) -> AppResult<Vec<i64>>;

    async fn members(&mut self, room_id: &str) -> AppResult<Vec<RoomMember>>;
}

fn room_from_row(row: &MySqlRow) -> Room {
    Room {
        id: row.get("id"),
        name: row.get("name"),
        host_id: row.get("host_id"),
        is_private: row.get("is_private"),
        is_closed: row.get("is_closed"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl RoomRepository for MySqlTx {
    async fn insert_room(&mut self, room: &Room) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO rooms (id, name, host_id, is_private, is_closed, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&room.id)
        .bind(&room.name)
        .bind(room.host_id)
        .bind(room.is_private)
        .bind(room.is_closed)
        .bind(room.created_at)
        .bind(room.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_room(&mut self, room_id: &str) -> AppResult<Option<Room>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, host_id, is_private, is_closed, created_at, updated_at
            FROM rooms
            WHERE id = ?
            "#,
        )
        .bind(room_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(room_from_row))
    }

    async fn lock_room(&mut self, room_id: &str) -> AppResult<Option<Room>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, host_id, is_private, is_closed, created_at, updated_at
            FROM rooms
            WHERE id = ?
            FOR UPDATE
            "#,
        )
        .bind(room_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(room_from_row))
    }

    async fn close_room(&mut self, room_id: &str) -> AppResult<()> {
        sqlx::query("UPDATE rooms SET is_closed = TRUE, updated_at = NOW(6) WHERE id = ?")
            .bind(room_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn rooms_for_user(&mut self, user_id: i64, offset: i64, limit: i64) -> AppResult<Vec<Room>> {
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.name, r.host_id, r.is_private, r.is_closed, r.created_at, r.updated_at
            FROM rooms r
            INNER JOIN room_members m ON m.room_id = r.id
            WHERE m.user_id = ? AND r.is_closed = FALSE
            ORDER BY r.updated_at DESC, r.id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.iter().map(room_from_row).collect())
    }

    async fn count_rooms_for_user(&mut self, user_id: i64) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM rooms r
            INNER JOIN room_members m ON m.room_id = r.id
            WHERE m.user_id = ? AND r.is_closed = FALSE
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count)
    }

    async fn add_member(&mut self, room_id: &str, user_id: i64) -> AppResult<()> {
        sqlx::query("INSERT INTO room_members (room_id, user_id, joined_at) VALUES (?, ?, NOW(6))")
            .bind(room_id)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn remove_member(&mut self, room_id: &str, user_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM room_members WHERE room_id = ? AND user_id = ?")
            .bind(room_id)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_member(&mut self, room_id: &str, user_id: i64) -> AppResult<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM room_members WHERE room_id = ? AND user_id = ?",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(found > 0)
    }

    async fn member_ids(&mut self, room_id: &str) -> AppResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM room_members WHERE room_id = ? ORDER BY user_id",
        )
        .bind(room_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(ids)
    }

    async fn members(&mut self, room_id: &str) -> AppResult<Vec<RoomMember>> {
        let rows = sqlx::query(
            r#"
            SELECT m.user_id, u.username
            FROM room_members m
            INNER JOIN users u ON u.id = m.user_id
            WHERE m.room_id = ?
            ORDER BY m.user_id
            "#,
        )
        .bind(room_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows
            .iter()
            .map(|row| RoomMember {
                user_id: row.get("user_id"),
                username: row.get("username"),
            })
            .collect())
    }
}
