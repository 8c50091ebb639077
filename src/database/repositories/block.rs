//! Connection block repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::BlockRecordDbModel;

/// Block repository trait.
#[async_trait]
pub trait BlockRepository: Send + Sync {
    async fn get(&self, handle: &str) -> Result<Option<BlockRecordDbModel>>;
    async fn list_active(&self, now_ms: i64) -> Result<Vec<BlockRecordDbModel>>;
    /// Insert or replace the single active record for an account.
    async fn upsert(&self, record: &BlockRecordDbModel) -> Result<()>;
    async fn delete(&self, handle: &str) -> Result<()>;
    async fn set_dismissed(&self, handle: &str, dismissed: bool) -> Result<()>;
}

/// SQLx implementation of BlockRepository.
pub struct SqlxBlockRepository {
    pool: SqlitePool,
}

impl SqlxBlockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlockRepository for SqlxBlockRepository {
    async fn get(&self, handle: &str) -> Result<Option<BlockRecordDbModel>> {
        let record = sqlx::query_as::<_, BlockRecordDbModel>(
            "SELECT * FROM connection_blocks WHERE account_handle = ?",
        )
        .bind(handle)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn list_active(&self, now_ms: i64) -> Result<Vec<BlockRecordDbModel>> {
        let records = sqlx::query_as::<_, BlockRecordDbModel>(
            "SELECT * FROM connection_blocks WHERE cooldown_until > ?",
        )
        .bind(now_ms)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn upsert(&self, record: &BlockRecordDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO connection_blocks (
                account_handle, first_blocked_at, last_blocked_at, block_count,
                cooldown_until, cooldown_hours, dismissed, last_error
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(account_handle) DO UPDATE SET
                first_blocked_at = excluded.first_blocked_at,
                last_blocked_at = excluded.last_blocked_at,
                block_count = excluded.block_count,
                cooldown_until = excluded.cooldown_until,
                cooldown_hours = excluded.cooldown_hours,
                dismissed = excluded.dismissed,
                last_error = excluded.last_error
            "#,
        )
        .bind(&record.account_handle)
        .bind(record.first_blocked_at)
        .bind(record.last_blocked_at)
        .bind(record.block_count)
        .bind(record.cooldown_until)
        .bind(record.cooldown_hours)
        .bind(record.dismissed)
        .bind(&record.last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, handle: &str) -> Result<()> {
        sqlx::query("DELETE FROM connection_blocks WHERE account_handle = ?")
            .bind(handle)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_dismissed(&self, handle: &str, dismissed: bool) -> Result<()> {
        sqlx::query("UPDATE connection_blocks SET dismissed = ? WHERE account_handle = ?")
            .bind(dismissed)
            .bind(handle)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
