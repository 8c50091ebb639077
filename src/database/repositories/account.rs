//! Account repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::AccountDbModel;
use crate::database::time::now_ms;

/// Account repository trait.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn get(&self, handle: &str) -> Result<Option<AccountDbModel>>;
    async fn list_monitoring_enabled(&self) -> Result<Vec<AccountDbModel>>;
    /// Accounts still carrying a session pointer (reconciliation input).
    async fn list_with_session_pointer(&self) -> Result<Vec<AccountDbModel>>;
    /// Insert or update by handle.
    async fn upsert(&self, account: &AccountDbModel) -> Result<()>;
    async fn set_monitoring_enabled(&self, handle: &str, enabled: bool) -> Result<()>;
    /// Attribute (or detach) the active session pointer.
    async fn set_current_session(&self, handle: &str, session_id: Option<&str>) -> Result<()>;
    /// Clear the session pointer and stamp the post-session cooldown anchor.
    async fn clear_session_pointer(&self, handle: &str, ended_at_ms: i64) -> Result<()>;
    async fn touch_checked(&self, handle: &str, checked_at_ms: i64) -> Result<()>;
    async fn touch_live(&self, handle: &str, live_at_ms: i64) -> Result<()>;
}

/// SQLx implementation of AccountRepository.
pub struct SqlxAccountRepository {
    pool: SqlitePool,
}

impl SqlxAccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for SqlxAccountRepository {
    async fn get(&self, handle: &str) -> Result<Option<AccountDbModel>> {
        let account =
            sqlx::query_as::<_, AccountDbModel>("SELECT * FROM accounts WHERE handle = ?")
                .bind(handle)
                .fetch_optional(&self.pool)
                .await?;
        Ok(account)
    }

    async fn list_monitoring_enabled(&self) -> Result<Vec<AccountDbModel>> {
        let accounts = sqlx::query_as::<_, AccountDbModel>(
            "SELECT * FROM accounts WHERE monitoring_enabled = 1 ORDER BY handle",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts)
    }

    async fn list_with_session_pointer(&self) -> Result<Vec<AccountDbModel>> {
        let accounts = sqlx::query_as::<_, AccountDbModel>(
            "SELECT * FROM accounts WHERE current_live_session_id IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts)
    }

    async fn upsert(&self, account: &AccountDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                handle, monitoring_enabled, current_live_session_id,
                last_checked_at, last_live_time, last_session_end_time,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(handle) DO UPDATE SET
                monitoring_enabled = excluded.monitoring_enabled,
                current_live_session_id = excluded.current_live_session_id,
                last_checked_at = excluded.last_checked_at,
                last_live_time = excluded.last_live_time,
                last_session_end_time = excluded.last_session_end_time,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&account.handle)
        .bind(account.monitoring_enabled)
        .bind(&account.current_live_session_id)
        .bind(account.last_checked_at)
        .bind(account.last_live_time)
        .bind(account.last_session_end_time)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_monitoring_enabled(&self, handle: &str, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE accounts SET monitoring_enabled = ?, updated_at = ? WHERE handle = ?")
            .bind(enabled)
            .bind(now_ms())
            .bind(handle)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_current_session(&self, handle: &str, session_id: Option<&str>) -> Result<()> {
        sqlx::query(
            "UPDATE accounts SET current_live_session_id = ?, updated_at = ? WHERE handle = ?",
        )
        .bind(session_id)
        .bind(now_ms())
        .bind(handle)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_session_pointer(&self, handle: &str, ended_at_ms: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE accounts SET
                current_live_session_id = NULL,
                last_session_end_time = ?,
                updated_at = ?
            WHERE handle = ?
            "#,
        )
        .bind(ended_at_ms)
        .bind(now_ms())
        .bind(handle)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn touch_checked(&self, handle: &str, checked_at_ms: i64) -> Result<()> {
        sqlx::query("UPDATE accounts SET last_checked_at = ?, updated_at = ? WHERE handle = ?")
            .bind(checked_at_ms)
            .bind(now_ms())
            .bind(handle)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn touch_live(&self, handle: &str, live_at_ms: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE accounts SET
                last_checked_at = ?,
                last_live_time = ?,
                updated_at = ?
            WHERE handle = ?
            "#,
        )
        .bind(live_at_ms)
        .bind(live_at_ms)
        .bind(now_ms())
        .bind(handle)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
