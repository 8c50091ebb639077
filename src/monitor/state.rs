//! Account monitoring state machine.
//!
//! The poller's decision table runs off one explicit state classification
//! instead of ad-hoc flag combinations, so every branch is enumerable and
//! testable in isolation.

use crate::database::models::{AccountDbModel, BlockRecordDbModel};

/// Monitoring state of one account at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountState {
    /// Monitoring is off and nothing is running for the account.
    Disabled,
    /// Eligible for a liveness probe.
    Idle,
    /// Inside a platform-block cooldown window; probes are skipped.
    Blocked { until_ms: i64 },
    /// Inside the reconnect-cooldown window after a session ended; probes
    /// are skipped to avoid lingering ghost rooms.
    PostSessionCooldown { until_ms: i64 },
    /// A supervisor is attributed to the account and its connection is up.
    Live { session_id: String },
}

impl AccountState {
    /// Classify an account, in the poller's priority order: block cooldown
    /// beats everything, a disabled account with no running session drops
    /// out, the post-session window gates probes, and a connected
    /// supervisor makes probing redundant.
    ///
    /// An account with a registered session whose supervisor is currently
    /// reconnecting classifies as `Idle`: a probe is allowed, and the
    /// session manager's idempotent start guard keeps it harmless.
    pub fn classify(
        account: &AccountDbModel,
        block: Option<&BlockRecordDbModel>,
        active_session_id: Option<String>,
        supervisor_connected: bool,
        post_session_window_ms: i64,
        now_ms: i64,
    ) -> Self {
        if let Some(block) = block {
            if block.is_in_cooldown(now_ms) {
                return Self::Blocked {
                    until_ms: block.cooldown_until,
                };
            }
        }

        let has_active_session = active_session_id.is_some();
        if !account.monitoring_enabled && !has_active_session {
            return Self::Disabled;
        }

        if !has_active_session {
            if let Some(end_ms) = account.last_session_end_time {
                let elapsed = now_ms - end_ms;
                if elapsed >= 0 && elapsed < post_session_window_ms {
                    return Self::PostSessionCooldown {
                        until_ms: end_ms + post_session_window_ms,
                    };
                }
            }
        }

        if supervisor_connected {
            if let Some(session_id) = active_session_id {
                return Self::Live { session_id };
            }
        }

        Self::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW_MS: i64 = 90_000;

    fn account(enabled: bool) -> AccountDbModel {
        let mut account = AccountDbModel::new("somehandle");
        account.monitoring_enabled = enabled;
        account
    }

    fn block(cooldown_until: i64) -> BlockRecordDbModel {
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
    fn test_block_cooldown_beats_everything() {
        let mut acc = account(true);
        acc.last_session_end_time = Some(1_000);
        let state = AccountState::classify(
            &acc,
            Some(&block(100_000)),
            Some("s1".to_string()),
            true,
            WINDOW_MS,
            50_000,
        );
        assert_eq!(state, AccountState::Blocked { until_ms: 100_000 });
    }

    #[test]
    fn test_expired_block_is_ignored() {
        let state = AccountState::classify(
            &account(true),
            Some(&block(10_000)),
            None,
            false,
            WINDOW_MS,
            50_000,
        );
        assert_eq!(state, AccountState::Idle);
    }

    #[test]
    fn test_disabled_without_session() {
        let state = AccountState::classify(&account(false), None, None, false, WINDOW_MS, 0);
        assert_eq!(state, AccountState::Disabled);
    }

    #[test]
    fn test_disabled_with_running_session_is_not_dropped() {
        // The session still needs its lifecycle handled.
        let state = AccountState::classify(
            &account(false),
            None,
            Some("s1".to_string()),
            true,
            WINDOW_MS,
            0,
        );
        assert_eq!(
            state,
            AccountState::Live {
                session_id: "s1".to_string()
            }
        );
    }

    #[test]
    fn test_post_session_window() {
        let mut acc = account(true);
        acc.last_session_end_time = Some(10_000);

        let inside = AccountState::classify(&acc, None, None, false, WINDOW_MS, 10_000 + 50_000);
        assert_eq!(
            inside,
            AccountState::PostSessionCooldown {
                until_ms: 10_000 + WINDOW_MS
            }
        );

        let after = AccountState::classify(&acc, None, None, false, WINDOW_MS, 10_000 + WINDOW_MS);
        assert_eq!(after, AccountState::Idle);
    }

    #[test]
    fn test_post_session_window_does_not_gate_active_session() {
        let mut acc = account(true);
        acc.last_session_end_time = Some(10_000);
        let state = AccountState::classify(
            &acc,
            None,
            Some("s1".to_string()),
            true,
            WINDOW_MS,
            10_000 + 50_000,
        );
        assert_eq!(
            state,
            AccountState::Live {
                session_id: "s1".to_string()
            }
        );
    }

    #[test]
    fn test_reconnecting_supervisor_classifies_idle() {
        // Session registered but connection currently down.
        let state = AccountState::classify(
            &account(true),
            None,
            Some("s1".to_string()),
            false,
            WINDOW_MS,
            0,
        );
        assert_eq!(state, AccountState::Idle);
    }

    #[test]
    fn test_enabled_quiet_account_is_idle() {
        let state = AccountState::classify(&account(true), None, None, false, WINDOW_MS, 0);
        assert_eq!(state, AccountState::Idle);
    }
}
