use async_trait::async_trait;
use common::AppResult;
use sqlx::{MySql, QueryBuilder, Row};

use super::mysql::MySqlTx;

#[async_trait]
pub trait UserRepository {
    /// The subset of `ids` that belong to existing users.
    async fn existing_user_ids(&mut self, ids: &[i64]) -> AppResult<Vec<i64>>;

    async fn find_username(&mut self, user_id: i64) -> AppResult<Option<String>>;
}

#[async_trait]
impl UserRepository for MySqlTx {
    async fn existing_user_ids(&mut self, ids: &[i64]) -> AppResult<Vec<i64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<MySql> = QueryBuilder::new("SELECT id FROM users WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows = query.build().fetch_all(&mut *self.tx).await?;
        Ok(rows.iter().map(|row| row.get::<i64, _>("id")).collect())
    }

    async fn find_username(&mut self, user_id: i64) -> AppResult<Option<String>> {
        let username = sqlx::query_scalar::<_, String>("SELECT username FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(username)
    }
}
