//! Tracked account database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Tracked account database model.
/// The central entity representing a live account to be monitored.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AccountDbModel {
    /// Platform handle, unique per account.
    pub handle: String,
    /// Whether the poller should check this account at all.
    pub monitoring_enabled: bool,
    /// Weak reference to the active live session, if any.
    ///
    /// Non-null iff a connection supervisor is actually attributed to this
    /// account; startup reconciliation clears stale pointers.
    pub current_live_session_id: Option<String>,
    /// Unix epoch milliseconds (UTC) of the last liveness check.
    pub last_checked_at: Option<i64>,
    /// Unix epoch milliseconds (UTC) of the last confirmed live detection.
    pub last_live_time: Option<i64>,
    /// Unix epoch milliseconds (UTC) when the last session ended.
    /// Anchor for the post-session reconnect cooldown.
    pub last_session_end_time: Option<i64>,
    /// Unix epoch milliseconds (UTC) when created.
    pub created_at: i64,
    /// Unix epoch milliseconds (UTC) when last updated.
    pub updated_at: i64,
}

impl AccountDbModel {
    /// Create a new account with monitoring disabled.
    pub fn new(handle: impl Into<String>) -> Self {
        let now = crate::database::time::now_ms();
        Self {
            handle: handle.into(),
            monitoring_enabled: false,
            current_live_session_id: None,
            last_checked_at: None,
            last_live_time: None,
            last_session_end_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a new account with monitoring enabled.
    pub fn monitored(handle: impl Into<String>) -> Self {
        let mut account = Self::new(handle);
        account.monitoring_enabled = true;
        account
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_new() {
        let account = AccountDbModel::new("somehandle");
        assert_eq!(account.handle, "somehandle");
        assert!(!account.monitoring_enabled);
        assert!(account.current_live_session_id.is_none());
    }

    #[test]
    fn test_account_monitored() {
        let account = AccountDbModel::monitored("somehandle");
        assert!(account.monitoring_enabled);
    }
}
