//! Session repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::{LiveSessionDbModel, SessionStats, SessionStatus};

/// Session repository trait.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<LiveSessionDbModel>>;
    async fn exists(&self, id: &str) -> Result<bool>;
    async fn create(&self, session: &LiveSessionDbModel) -> Result<()>;
    /// Sessions still marked LIVE (reconciliation input).
    async fn list_live(&self) -> Result<Vec<LiveSessionDbModel>>;
    async fn list_for_account(&self, handle: &str, limit: i32) -> Result<Vec<LiveSessionDbModel>>;
    /// Terminate a session: set status and default the end time if unset.
    async fn end_session(&self, id: &str, end_time: &str, status: SessionStatus) -> Result<()>;
    /// Apply a coalesced counter delta: additive counters are summed in
    /// SQL, the viewer watermark takes the max.
    async fn apply_stats_delta(&self, id: &str, delta: &SessionStats) -> Result<()>;
    async fn get_stats(&self, id: &str) -> Result<Option<SessionStats>>;
}

/// SQLx implementation of SessionRepository.
pub struct SqlxSessionRepository {
    pool: SqlitePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn get(&self, id: &str) -> Result<Option<LiveSessionDbModel>> {
        let session =
            sqlx::query_as::<_, LiveSessionDbModel>("SELECT * FROM live_sessions WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(session)
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM live_sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn create(&self, session: &LiveSessionDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO live_sessions (
                id, account_handle, start_time, end_time, status, room_id,
                total_likes, peak_viewers, total_gifts, total_messages,
                total_joins, total_follows, total_shares, total_reposts,
                total_leaves, total_subscribes, total_emotes
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.account_handle)
        .bind(&session.start_time)
        .bind(&session.end_time)
        .bind(&session.status)
        .bind(&session.room_id)
        .bind(session.stats.total_likes)
        .bind(session.stats.peak_viewers)
        .bind(session.stats.total_gifts)
        .bind(session.stats.total_messages)
        .bind(session.stats.total_joins)
        .bind(session.stats.total_follows)
        .bind(session.stats.total_shares)
        .bind(session.stats.total_reposts)
        .bind(session.stats.total_leaves)
        .bind(session.stats.total_subscribes)
        .bind(session.stats.total_emotes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_live(&self) -> Result<Vec<LiveSessionDbModel>> {
        let sessions = sqlx::query_as::<_, LiveSessionDbModel>(
            "SELECT * FROM live_sessions WHERE status = 'LIVE'",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    async fn list_for_account(&self, handle: &str, limit: i32) -> Result<Vec<LiveSessionDbModel>> {
        let sessions = sqlx::query_as::<_, LiveSessionDbModel>(
            "SELECT * FROM live_sessions WHERE account_handle = ? ORDER BY start_time DESC LIMIT ?",
        )
        .bind(handle)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    async fn end_session(&self, id: &str, end_time: &str, status: SessionStatus) -> Result<()> {
        sqlx::query(
            "UPDATE live_sessions SET status = ?, end_time = COALESCE(end_time, ?) WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(end_time)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn apply_stats_delta(&self, id: &str, delta: &SessionStats) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE live_sessions SET
                total_likes = total_likes + ?,
                peak_viewers = MAX(peak_viewers, ?),
                total_gifts = total_gifts + ?,
                total_messages = total_messages + ?,
                total_joins = total_joins + ?,
                total_follows = total_follows + ?,
                total_shares = total_shares + ?,
                total_reposts = total_reposts + ?,
                total_leaves = total_leaves + ?,
                total_subscribes = total_subscribes + ?,
                total_emotes = total_emotes + ?
            WHERE id = ?
            "#,
        )
        .bind(delta.total_likes)
        .bind(delta.peak_viewers)
        .bind(delta.total_gifts)
        .bind(delta.total_messages)
        .bind(delta.total_joins)
        .bind(delta.total_follows)
        .bind(delta.total_shares)
        .bind(delta.total_reposts)
        .bind(delta.total_leaves)
        .bind(delta.total_subscribes)
        .bind(delta.total_emotes)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_stats(&self, id: &str) -> Result<Option<SessionStats>> {
        let stats = sqlx::query_as::<_, SessionStats>(
            r#"
            SELECT total_likes, peak_viewers, total_gifts, total_messages,
                   total_joins, total_follows, total_shares, total_reposts,
                   total_leaves, total_subscribes, total_emotes
            FROM live_sessions WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(stats)
    }
}
