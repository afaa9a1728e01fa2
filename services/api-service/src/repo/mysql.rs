use async_trait::async_trait;
use common::AppResult;
use sqlx::{MySql, MySqlPool, Transaction};

use super::{Store, StoreTx};

#[derive(Clone)]
pub struct MySqlStore {
    pub pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

/// One MySQL transaction. Rolled back by sqlx when dropped uncommitted.
pub struct MySqlTx {
    pub(crate) tx: Transaction<'static, MySql>,
}

#[async_trait]
impl Store for MySqlStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(MySqlTx { tx }))
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl StoreTx for MySqlTx {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
