//! Connection block database model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Connection block database model.
/// One active record per account; created on a detected platform block and
/// cleared on confirmed recovery.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BlockRecordDbModel {
    pub account_handle: String,
    /// Unix epoch milliseconds (UTC) of the first block in this streak.
    pub first_blocked_at: i64,
    /// Unix epoch milliseconds (UTC) of the most recent block.
    pub last_blocked_at: i64,
    /// Cumulative block count for the streak.
    pub block_count: i64,
    /// Unix epoch milliseconds (UTC) until which probes are skipped.
    pub cooldown_until: i64,
    /// Cooldown window length in hours (for operator display).
    pub cooldown_hours: f64,
    /// Acknowledged by an operator; does not shorten the cooldown.
    pub dismissed: bool,
    pub last_error: Option<String>,
}

impl BlockRecordDbModel {
    /// Whether the cooldown window is still running at `now_ms`.
    pub fn is_in_cooldown(&self, now_ms: i64) -> bool {
        now_ms < self.cooldown_until
    }

    /// Remaining cooldown at `now_ms`, zero when expired.
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        (self.cooldown_until - now_ms).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(cooldown_until: i64) -> BlockRecordDbModel {
        BlockRecordDbModel {
            account_handle: "somehandle".to_string(),
            first_blocked_at: 0,
            last_blocked_at: 0,
            block_count: 1,
            cooldown_until,
            cooldown_hours: 1.0,
            dismissed: false,
            last_error: None,
        }
    }

    #[test]
    fn test_cooldown_window() {
        let rec = record(10_000);
        assert!(rec.is_in_cooldown(9_999));
        assert!(!rec.is_in_cooldown(10_000));
        assert_eq!(rec.remaining_ms(4_000), 6_000);
        assert_eq!(rec.remaining_ms(20_000), 0);
    }
}
