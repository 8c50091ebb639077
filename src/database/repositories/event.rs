//! Event and snapshot repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::{LiveEventDbModel, StatsSnapshotDbModel};

/// Event repository trait.
///
/// Events and snapshots are append-only; inserts are idempotent by primary
/// key so flush retries after partial failures stay safe.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Insert a batch of events in one transaction, preserving order.
    /// Duplicate ids are ignored. Returns the number of rows inserted.
    async fn insert_events(&self, events: &[LiveEventDbModel]) -> Result<u64>;
    async fn count_for_session(&self, session_id: &str) -> Result<i64>;
    async fn list_for_session(&self, session_id: &str, limit: i32)
    -> Result<Vec<LiveEventDbModel>>;
    async fn insert_snapshot(&self, snapshot: &StatsSnapshotDbModel) -> Result<()>;
    async fn list_snapshots(&self, session_id: &str) -> Result<Vec<StatsSnapshotDbModel>>;
}

/// SQLx implementation of EventRepository.
pub struct SqlxEventRepository {
    pool: SqlitePool,
}

impl SqlxEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRepository for SqlxEventRepository {
    async fn insert_events(&self, events: &[LiveEventDbModel]) -> Result<u64> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for event in events {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO live_events (
                    id, session_id, event_type, timestamp,
                    user_json, payload_json, location
                )
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&event.id)
            .bind(&event.session_id)
            .bind(&event.event_type)
            .bind(&event.timestamp)
            .bind(&event.user_json)
            .bind(&event.payload_json)
            .bind(&event.location)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn count_for_session(&self, session_id: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM live_events WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    async fn list_for_session(
        &self,
        session_id: &str,
        limit: i32,
    ) -> Result<Vec<LiveEventDbModel>> {
        let events = sqlx::query_as::<_, LiveEventDbModel>(
            "SELECT * FROM live_events WHERE session_id = ? ORDER BY timestamp LIMIT ?",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn insert_snapshot(&self, snapshot: &StatsSnapshotDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO stats_snapshots (
                id, session_id, timestamp,
                total_likes, peak_viewers, total_gifts, total_messages,
                total_joins, total_follows, total_shares, total_reposts,
                total_leaves, total_subscribes, total_emotes
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&snapshot.id)
        .bind(&snapshot.session_id)
        .bind(&snapshot.timestamp)
        .bind(snapshot.stats.total_likes)
        .bind(snapshot.stats.peak_viewers)
        .bind(snapshot.stats.total_gifts)
        .bind(snapshot.stats.total_messages)
        .bind(snapshot.stats.total_joins)
        .bind(snapshot.stats.total_follows)
        .bind(snapshot.stats.total_shares)
        .bind(snapshot.stats.total_reposts)
        .bind(snapshot.stats.total_leaves)
        .bind(snapshot.stats.total_subscribes)
        .bind(snapshot.stats.total_emotes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_snapshots(&self, session_id: &str) -> Result<Vec<StatsSnapshotDbModel>> {
        let snapshots = sqlx::query_as::<_, StatsSnapshotDbModel>(
            "SELECT * FROM stats_snapshots WHERE session_id = ? ORDER BY timestamp",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(snapshots)
    }
}
