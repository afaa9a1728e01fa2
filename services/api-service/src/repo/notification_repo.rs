use async_trait::async_trait;
use chrono::Utc;
use common::AppResult;
use sqlx::mysql::MySqlRow;
use sqlx::Row;

use super::mysql::MySqlTx;
use crate::domain::{Notification, PushSubscription};

#[async_trait]
pub trait NotificationRepository {
    async fn insert_notification(&mut self, user_id: i64, title: &str, content: &str) -> AppResult<Notification>;

    async fn notifications_for_user(&mut self, user_id: i64) -> AppResult<Vec<Notification>>;

    /// Returns false when no notification with that id belongs to the user.
    async fn mark_notification_read(&mut self, notification_id: i64, user_id: i64) -> AppResult<bool>;

    async fn subscriptions_for_user(&mut self, user_id: i64) -> AppResult<Vec<PushSubscription>>;

    /// Inserts, or rebinds an existing endpoint to the new owner and keys.
    async fn upsert_subscription(&mut self, subscription: &PushSubscription) -> AppResult<PushSubscription>;

    async fn delete_subscription(&mut self, subscription_id: &str, user_id: i64) -> AppResult<bool>;
}

fn subscription_from_row(row: &MySqlRow) -> PushSubscription {
    PushSubscription {
        id: row.get("id"),
        user_id: row.get("user_id"),
        endpoint: row.get("endpoint"),
        auth: row.get("auth"),
        p256dh: row.get("p256dh"),
    }
}

#[async_trait]
impl NotificationRepository for MySqlTx {
    async fn insert_notification(&mut self, user_id: i64, title: &str, content: &str) -> AppResult<Notification> {
        let created_at = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO notifications (user_id, title, content, is_read, created_at)
            VALUES (?, ?, ?, FALSE, ?)
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(content)
        .bind(created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(Notification {
            id: result.last_insert_id() as i64,
            user_id,
            title: title.to_string(),
            content: content.to_string(),
            is_read: false,
            created_at,
        })
    }

    async fn notifications_for_user(&mut self, user_id: i64) -> AppResult<Vec<Notification>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, title, content, is_read, created_at
            FROM notifications
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Notification {
                id: row.get("id"),
                user_id: row.get("user_id"),
                title: row.get("title"),
                content: row.get("content"),
                is_read: row.get("is_read"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn mark_notification_read(&mut self, notification_id: i64, user_id: i64) -> AppResult<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE id = ? AND user_id = ?",
        )
        .bind(notification_id)
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;
        if found == 0 {
            return Ok(false);
        }

        sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = ?")
            .bind(notification_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(true)
    }

    async fn subscriptions_for_user(&mut self, user_id: i64) -> AppResult<Vec<PushSubscription>> {
        let rows = sqlx::query(
            "SELECT id, user_id, endpoint, auth, p256dh FROM subscriptions WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.iter().map(subscription_from_row).collect())
    }

    async fn upsert_subscription(&mut self, subscription: &PushSubscription) -> AppResult<PushSubscription> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (id, user_id, endpoint, auth, p256dh)
            VALUES (?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE user_id = VALUES(user_id), auth = VALUES(auth), p256dh = VALUES(p256dh)
            "#,
        )
        .bind(&subscription.id)
        .bind(subscription.user_id)
        .bind(&subscription.endpoint)
        .bind(&subscription.auth)
        .bind(&subscription.p256dh)
        .execute(&mut *self.tx)
        .await?;

        let row = sqlx::query(
            "SELECT id, user_id, endpoint, auth, p256dh FROM subscriptions WHERE endpoint = ?",
        )
        .bind(&subscription.endpoint)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(subscription_from_row(&row))
    }

    async fn delete_subscription(&mut self, subscription_id: &str, user_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = ? AND user_id = ?")
            .bind(subscription_id)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
