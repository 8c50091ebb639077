//! Live session database model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Live session status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Session is ongoing and a supervisor is attached.
    Live,
    /// Session ended cleanly (stream end, explicit stop, or reconciliation).
    Ended,
    /// Session was terminated by a supervisor failure or block detection.
    ConnectionFailed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "LIVE",
            Self::Ended => "ENDED",
            Self::ConnectionFailed => "CONNECTION_FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LIVE" => Some(Self::Live),
            "ENDED" => Some(Self::Ended),
            "CONNECTION_FAILED" => Some(Self::ConnectionFailed),
            _ => None,
        }
    }
}

/// Aggregate counters for a live session.
///
/// Shared between the session row and stats snapshots; all counters are
/// additive except `peak_viewers`, which is a max watermark.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_likes: i64,
    pub peak_viewers: i64,
    pub total_gifts: i64,
    pub total_messages: i64,
    pub total_joins: i64,
    pub total_follows: i64,
    pub total_shares: i64,
    pub total_reposts: i64,
    pub total_leaves: i64,
    pub total_subscribes: i64,
    pub total_emotes: i64,
}

impl SessionStats {
    /// Merge a delta into this stats copy: sums for additive counters,
    /// max for the viewer watermark.
    pub fn merge(&mut self, delta: &SessionStats) {
        self.total_likes += delta.total_likes;
        self.total_gifts += delta.total_gifts;
        self.total_messages += delta.total_messages;
        self.total_joins += delta.total_joins;
        self.total_follows += delta.total_follows;
        self.total_shares += delta.total_shares;
        self.total_reposts += delta.total_reposts;
        self.total_leaves += delta.total_leaves;
        self.total_subscribes += delta.total_subscribes;
        self.total_emotes += delta.total_emotes;
        self.peak_viewers = self.peak_viewers.max(delta.peak_viewers);
    }

    /// True when every counter is zero.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Live session database model.
/// Represents a single, continuous live broadcast being captured.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LiveSessionDbModel {
    pub id: String,
    pub account_handle: String,
    /// ISO 8601 timestamp when the session began.
    pub start_time: String,
    /// ISO 8601 timestamp when the session ended (null if ongoing).
    pub end_time: Option<String>,
    /// LIVE, ENDED, CONNECTION_FAILED.
    pub status: String,
    /// Transport room identifier the session was captured from.
    pub room_id: Option<String>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub stats: SessionStats,
}

impl LiveSessionDbModel {
    pub fn new(account_handle: impl Into<String>, room_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_handle: account_handle.into(),
            start_time: Utc::now().to_rfc3339(),
            end_time: None,
            status: SessionStatus::Live.as_str().to_string(),
            room_id,
            stats: SessionStats::default(),
        }
    }

    /// Parsed status; unknown strings map to `Ended` (safest for consumers).
    pub fn status(&self) -> SessionStatus {
        SessionStatus::parse(&self.status).unwrap_or(SessionStatus::Ended)
    }

    /// Parsed start time, if well-formed.
    pub fn start_time_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.start_time)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_new() {
        let session = LiveSessionDbModel::new("somehandle", Some("room-42".to_string()));
        assert_eq!(session.account_handle, "somehandle");
        assert_eq!(session.status(), SessionStatus::Live);
        assert!(session.end_time.is_none());
        assert!(session.stats.is_empty());
    }

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(SessionStatus::parse("LIVE"), Some(SessionStatus::Live));
        assert_eq!(
            SessionStatus::parse("CONNECTION_FAILED"),
            Some(SessionStatus::ConnectionFailed)
        );
        assert_eq!(SessionStatus::parse("bogus"), None);
        assert_eq!(SessionStatus::Ended.as_str(), "ENDED");
    }

    #[test]
    fn test_stats_merge() {
        let mut stats = SessionStats {
            total_gifts: 2,
            peak_viewers: 10,
            ..Default::default()
        };
        let delta = SessionStats {
            total_gifts: 3,
            peak_viewers: 7,
            total_messages: 1,
            ..Default::default()
        };
        stats.merge(&delta);
        assert_eq!(stats.total_gifts, 5);
        assert_eq!(stats.total_messages, 1);
        // Watermark keeps the max, not the sum.
        assert_eq!(stats.peak_viewers, 10);
    }
}
