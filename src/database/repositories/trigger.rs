//! Trigger word repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::TriggerWordDbModel;

/// Trigger word repository trait.
#[async_trait]
pub trait TriggerWordRepository: Send + Sync {
    async fn list_enabled(&self) -> Result<Vec<TriggerWordDbModel>>;
    async fn insert(&self, word: &TriggerWordDbModel) -> Result<()>;
    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// SQLx implementation of TriggerWordRepository.
pub struct SqlxTriggerWordRepository {
    pool: SqlitePool,
}

impl SqlxTriggerWordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TriggerWordRepository for SqlxTriggerWordRepository {
    async fn list_enabled(&self) -> Result<Vec<TriggerWordDbModel>> {
        let words = sqlx::query_as::<_, TriggerWordDbModel>(
            "SELECT * FROM trigger_words WHERE enabled = 1 ORDER BY word",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(words)
    }

    async fn insert(&self, word: &TriggerWordDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trigger_words (id, word, enabled, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(word) DO UPDATE SET enabled = excluded.enabled
            "#,
        )
        .bind(&word.id)
        .bind(&word.word)
        .bind(word.enabled)
        .bind(word.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE trigger_words SET enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM trigger_words WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
