use async_trait::async_trait;
use common::AppResult;
use sqlx::mysql::MySqlRow;
use sqlx::Row;

use super::mysql::MySqlTx;
use crate::domain::Message;

#[async_trait]
pub trait MessageRepository {
    async fn insert_message(&mut self, message: &Message) -> AppResult<()>;

    async fn find_message(&mut self, room_id: &str, message_id: &str) -> AppResult<Option<Message>>;

    async fn count_messages(&mut self, room_id: &str) -> AppResult<i64>;

    async fn messages_page(
        &mut self,
        room_id: &str,
        offset: i64,
        limit: i64,
        asc: bool,
    ) -> AppResult<Vec<Message>>;
}

fn message_from_row(row: &MySqlRow) -> Message {
    Message {
        id: row.get("id"),
        room_id: row.get("room_id"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        sent_at: row.get("sent_at"),
    }
}

#[async_trait]
impl MessageRepository for MySqlTx {
    async fn insert_message(&mut self, message: &Message) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, room_id, sender_id, content, sent_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.room_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(message.sent_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn find_message(&mut self, room_id: &str, message_id: &str) -> AppResult<Option<Message>> {
        let row = sqlx::query(
            r#"
            SELECT id, room_id, sender_id, content, sent_at
            FROM messages
            WHERE id = ? AND room_id = ?
            "#,
        )
        .bind(message_id)
        .bind(room_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.as_ref().map(message_from_row))
    }

    async fn count_messages(&mut self, room_id: &str) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE room_id = ?")
            .bind(room_id)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(count)
    }

    async fn messages_page(
        &mut self,
        room_id: &str,
        offset: i64,
        limit: i64,
        asc: bool,
    ) -> AppResult<Vec<Message>> {
        let sql = if asc {
            r#"
            SELECT id, room_id, sender_id, content, sent_at
            FROM messages
            WHERE room_id = ?
            ORDER BY sent_at ASC, id ASC
            LIMIT ? OFFSET ?
            "#
        } else {
            r#"
            SELECT id, room_id, sender_id, content, sent_at
            FROM messages
            WHERE room_id = ?
            ORDER BY sent_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#
        };

        let rows = sqlx::query(sql)
            .bind(room_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(rows.iter().map(message_from_row).collect())
    }
}
