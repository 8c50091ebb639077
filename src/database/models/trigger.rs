//! Trigger word database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Trigger word database model.
/// Chat events are matched against enabled words to raise alerts.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TriggerWordDbModel {
    pub id: String,
    pub word: String,
    pub enabled: bool,
    /// Unix epoch milliseconds (UTC) when created.
    pub created_at: i64,
}

impl TriggerWordDbModel {
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            word: word.into(),
            enabled: true,
            created_at: crate::database::time::now_ms(),
        }
    }
}
