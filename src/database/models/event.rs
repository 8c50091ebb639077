//! Live event and stats snapshot database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::models::SessionStats;
use crate::transport::LiveEvent;

/// Live event database model.
/// Append-only; rows are never mutated after insert and inserts are
/// idempotent by id.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LiveEventDbModel {
    pub id: String,
    /// Hard foreign key; the insert is refused when the session row is gone.
    pub session_id: String,
    pub event_type: String,
    /// ISO 8601 timestamp.
    pub timestamp: String,
    /// User-context blob (JSON).
    pub user_json: Option<String>,
    /// Type-specific payload blob (JSON).
    pub payload_json: Option<String>,
    pub location: Option<String>,
}

impl LiveEventDbModel {
    /// Build a row from a transport event, attributing it to a session.
    pub fn from_live_event(session_id: impl Into<String>, event: &LiveEvent) -> Self {
        let user_json = event
            .user
            .as_ref()
            .and_then(|u| serde_json::to_string(u).ok());
        let payload_json = if event.payload.is_null() {
            None
        } else {
            serde_json::to_string(&event.payload).ok()
        };
        Self {
            id: event.id.clone(),
            session_id: session_id.into(),
            event_type: event.kind.as_str().to_string(),
            timestamp: event.timestamp.to_rfc3339(),
            user_json,
            payload_json,
            location: event.location.clone(),
        }
    }
}

/// Stats snapshot database model.
/// A full copy of the session counters at one instant; append-only.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StatsSnapshotDbModel {
    pub id: String,
    pub session_id: String,
    /// ISO 8601 timestamp.
    pub timestamp: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub stats: SessionStats,
}

impl StatsSnapshotDbModel {
    pub fn new(session_id: impl Into<String>, stats: SessionStats) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{EventKind, UserContext};

    #[test]
    fn test_from_live_event() {
        let event = LiveEvent::chat(
            "evt-1",
            UserContext::new("u1", "someuser"),
            "hello there",
        );
        let row = LiveEventDbModel::from_live_event("session-1", &event);

        assert_eq!(row.id, "evt-1");
        assert_eq!(row.session_id, "session-1");
        assert_eq!(row.event_type, EventKind::Chat.as_str());
        assert!(row.user_json.as_deref().unwrap().contains("someuser"));
        assert!(row.payload_json.as_deref().unwrap().contains("hello there"));
    }

    #[test]
    fn test_snapshot_copies_stats() {
        let stats = SessionStats {
            total_gifts: 3,
            ..Default::default()
        };
        let snapshot = StatsSnapshotDbModel::new("session-1", stats.clone());
        assert_eq!(snapshot.stats, stats);
        assert_eq!(snapshot.session_id, "session-1");
    }
}
