//! Per-account liveness polling.
//!
//! Each enabled account owns one cancellable timer chain: the chain sleeps,
//! runs `check_account`, and reschedules itself with a state-dependent
//! delay (online/offline/cooldown). Chains are independent across accounts;
//! an error inside a check is converted into an offline reschedule and
//! never kills the chain.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use rand::RngExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::Result;
use crate::config::{MonitorSettings, SettingsService};
use crate::database::models::{AccountDbModel, SessionStatus};
use crate::database::repositories::Store;
use crate::database::time::now_ms;
use crate::monitor::blocks::BlockTracker;
use crate::monitor::events::{MonitorEvent, MonitorEventBroadcaster};
use crate::monitor::prober::LivenessProber;
use crate::monitor::state::AccountState;
use crate::session::SessionManager;

/// Extra delay added when rescheduling for the end of a block cooldown.
const COOLDOWN_RESCHEDULE_BUFFER: Duration = Duration::from_secs(30);

/// Recheck delay after a probe contradicted a connected supervisor.
const FALSE_NEGATIVE_RECHECK: Duration = Duration::from_secs(30);

/// Result of one account check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Run the next check after this delay.
    Reschedule(Duration),
    /// Monitoring is disabled; end the timer chain.
    Stop,
}

struct TimerEntry {
    chain_id: u64,
    token: CancellationToken,
}

/// Drives periodic liveness checks for all enabled accounts.
pub struct AccountPoller {
    store: Store,
    settings: Arc<SettingsService>,
    prober: Arc<LivenessProber>,
    blocks: Arc<BlockTracker>,
    sessions: Arc<SessionManager>,
    broadcaster: MonitorEventBroadcaster,
    /// One timer chain per handle.
    timers: DashMap<String, TimerEntry>,
    /// Handles with a one-shot recovery probe pending.
    recovery_pending: DashMap<String, ()>,
    chain_counter: AtomicU64,
    shutdown: CancellationToken,
}

impl AccountPoller {
    pub fn new(
        store: Store,
        settings: Arc<SettingsService>,
        prober: Arc<LivenessProber>,
        blocks: Arc<BlockTracker>,
        sessions: Arc<SessionManager>,
        broadcaster: MonitorEventBroadcaster,
    ) -> Self {
        Self {
            store,
            settings,
            prober,
            blocks,
            sessions,
            broadcaster,
            timers: DashMap::new(),
            recovery_pending: DashMap::new(),
            chain_counter: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    /// Start timer chains for every account with monitoring enabled.
    pub async fn bootstrap(self: &Arc<Self>) -> Result<usize> {
        let accounts = self.store.accounts.list_monitoring_enabled().await?;
        let count = accounts.len();
        for account in accounts {
            self.schedule(&account.handle, Duration::ZERO);
        }
        info!(count, "Poller bootstrapped");
        Ok(count)
    }

    /// Enable monitoring for an account and start its chain.
    pub async fn enable_account(self: &Arc<Self>, handle: &str) -> Result<()> {
        self.store.accounts.set_monitoring_enabled(handle, true).await?;
        self.broadcaster.publish(MonitorEvent::MonitoringStateChanged {
            handle: handle.to_string(),
            enabled: true,
            timestamp: Utc::now(),
        });
        self.schedule(handle, Duration::ZERO);
        Ok(())
    }

    /// Disable monitoring: stop the active session (if any), cancel the
    /// timer chain, and persist the flag.
    pub async fn disable_account(&self, handle: &str) -> Result<()> {
        self.store.accounts.set_monitoring_enabled(handle, false).await?;
        self.cancel(handle);
        self.sessions.stop_monitoring(handle).await?;
        self.broadcaster.publish(MonitorEvent::MonitoringStateChanged {
            handle: handle.to_string(),
            enabled: false,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Cancel the timer chain for a handle (account deletion, disable).
    pub fn cancel(&self, handle: &str) {
        if let Some((_, entry)) = self.timers.remove(handle) {
            entry.token.cancel();
        }
    }

    /// Cancel every chain (graceful shutdown).
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.timers.clear();
    }

    /// Whether a chain is currently scheduled for this handle.
    pub fn is_scheduled(&self, handle: &str) -> bool {
        self.timers.contains_key(handle)
    }

    /// Schedule (or replace) the timer chain for a handle.
    pub fn schedule(self: &Arc<Self>, handle: &str, initial_delay: Duration) {
        let chain_id = self.chain_counter.fetch_add(1, Ordering::SeqCst);
        let token = self.shutdown.child_token();
        if let Some(old) = self.timers.insert(
            handle.to_string(),
            TimerEntry {
                chain_id,
                token: token.clone(),
            },
        ) {
            old.token.cancel();
        }

        let poller = self.clone();
        let handle = handle.to_string();
        tokio::spawn(async move {
            let mut delay = initial_delay;
            loop {
                let jitter = {
                    let max_jitter = poller.settings.current().await.check_jitter.as_millis() as u64;
                    if max_jitter == 0 {
                        0
                    } else {
                        rand::rng().random_range(0..=max_jitter)
                    }
                };
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(delay + Duration::from_millis(jitter)) => {}
                }
                if token.is_cancelled() {
                    return;
                }
                match poller.check_account(&handle).await {
                    CheckOutcome::Reschedule(next) => delay = next,
                    CheckOutcome::Stop => {
                        poller
                            .timers
                            .remove_if(&handle, |_, entry| entry.chain_id == chain_id);
                        return;
                    }
                }
            }
        });
    }

    /// Run one check for a handle and decide the next scheduling step.
    /// Used by the timer chains and callable directly for an on-demand
    /// check. Never fails: any error becomes an offline-interval reschedule
    /// so the chain survives.
    pub async fn check_account(self: &Arc<Self>, handle: &str) -> CheckOutcome {
        let settings = self.settings.current().await;
        match self.try_check(handle, &settings).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(handle, "Account check failed, treating as offline: {}", e);
                CheckOutcome::Reschedule(settings.offline_check_interval)
            }
        }
    }

    async fn try_check(
        self: &Arc<Self>,
        handle: &str,
        settings: &MonitorSettings,
    ) -> Result<CheckOutcome> {
        let now = now_ms();

        let Some(account) = self.store.accounts.get(handle).await? else {
            debug!(handle, "Account deleted, ending timer chain");
            return Ok(CheckOutcome::Stop);
        };
        let block = self.store.blocks.get(handle).await?;

        let state = AccountState::classify(
            &account,
            block.as_ref(),
            self.sessions.active_session_id(handle),
            self.sessions.is_supervisor_connected(handle),
            settings.post_session_cooldown.as_millis() as i64,
            now,
        );

        match state {
            // Active block cooldown: skip entirely, come back when it ends.
            AccountState::Blocked { until_ms } => {
                let remaining = Duration::from_millis((until_ms - now).max(0) as u64);
                debug!(handle, ?remaining, "In block cooldown, skipping check");
                self.ensure_recovery_probe(handle, settings);
                Ok(CheckOutcome::Reschedule(
                    remaining + COOLDOWN_RESCHEDULE_BUFFER,
                ))
            }
            // Monitoring disabled with no live supervisor: clear any stale
            // pointer and end the chain until re-enabled externally.
            AccountState::Disabled => {
                if account.current_live_session_id.is_some() {
                    self.store.accounts.set_current_session(handle, None).await?;
                }
                debug!(handle, "Monitoring disabled, ending timer chain");
                Ok(CheckOutcome::Stop)
            }
            // Post-session cooldown: avoid reconnecting into a lingering
            // ghost room right after a session ended.
            AccountState::PostSessionCooldown { until_ms } => {
                let remainder = Duration::from_millis((until_ms - now).max(0) as u64);
                debug!(handle, ?remainder, "In post-session cooldown, skipping probe");
                Ok(CheckOutcome::Reschedule(remainder))
            }
            // Supervisor already connected: a probe here would be redundant
            // and a false negative would be destructive. Just refresh.
            AccountState::Live { .. } => {
                self.store.accounts.touch_live(handle, now).await?;
                Ok(CheckOutcome::Reschedule(settings.online_check_interval))
            }
            AccountState::Idle => self.probe_and_decide(handle, &account, settings, now).await,
        }
    }

    /// The probe path of the decision table: run the liveness probe and act
    /// on its verdict.
    async fn probe_and_decide(
        self: &Arc<Self>,
        handle: &str,
        account: &AccountDbModel,
        settings: &MonitorSettings,
        now: i64,
    ) -> Result<CheckOutcome> {
        self.store.accounts.touch_checked(handle, now).await?;
        let previous_room_id = self.previous_room_id(handle).await?;
        let mut outcome = self
            .prober
            .probe(handle, previous_room_id.as_deref())
            .await;

        if outcome.blocked && settings.quick_retry_enabled {
            // Bounded short-interval retries before accepting the block.
            for attempt in 1..=settings.quick_retry_attempts {
                tokio::time::sleep(settings.quick_retry_interval).await;
                debug!(handle, attempt, "Quick-retry probe after block signal");
                outcome = self
                    .prober
                    .probe(handle, previous_room_id.as_deref())
                    .await;
                if !outcome.blocked {
                    break;
                }
            }
        }

        if outcome.blocked {
            if settings.auto_cooldown_enabled {
                self.blocks
                    .record_block(handle, "liveness probe blocked")
                    .await?;
            }
            if settings.stop_on_block && self.sessions.is_active(handle) {
                self.sessions.stop_monitoring(handle).await?;
            }
            self.ensure_recovery_probe(handle, settings);
            let delay = match self.blocks.remaining_cooldown(handle).await? {
                Some(remaining) => remaining + COOLDOWN_RESCHEDULE_BUFFER,
                None => settings.offline_check_interval,
            };
            return Ok(CheckOutcome::Reschedule(delay));
        }

        // The probe connected without a block signal; a lingering block
        // record is confirmed recovered.
        if outcome.room_id.is_some() {
            self.blocks.clear_block(handle).await?;
        }

        if outcome.is_live {
            let room_id = outcome.room_id.clone().unwrap_or_default();
            if account.monitoring_enabled && !self.sessions.is_active(handle) {
                self.broadcaster.publish(MonitorEvent::AccountLive {
                    handle: handle.to_string(),
                    room_id: room_id.clone(),
                    timestamp: Utc::now(),
                });
                self.sessions.start_monitoring(handle, &room_id).await?;
            }
            return Ok(CheckOutcome::Reschedule(settings.online_check_interval));
        }

        // Not live. A still-connected supervisor wins over the probe: this
        // is a false negative, never acted upon destructively.
        if self.sessions.is_supervisor_connected(handle) {
            warn!(
                handle,
                reason = ?outcome.reason,
                "Probe reported offline while supervisor is connected, keeping session"
            );
            return Ok(CheckOutcome::Reschedule(FALSE_NEGATIVE_RECHECK));
        }

        // Stale pointer with no supervisor behind it: end and clear.
        if let Some(session_id) = &account.current_live_session_id {
            if !self.sessions.is_active(handle) {
                debug!(handle, %session_id, "Clearing stale session pointer after offline probe");
                self.store
                    .sessions
                    .end_session(session_id, &Utc::now().to_rfc3339(), SessionStatus::Ended)
                    .await?;
                self.store.accounts.clear_session_pointer(handle, now).await?;
                self.broadcaster.publish(MonitorEvent::AccountOffline {
                    handle: handle.to_string(),
                    session_id: Some(session_id.clone()),
                    timestamp: Utc::now(),
                });
            }
        }

        Ok(CheckOutcome::Reschedule(settings.offline_check_interval))
    }

    /// Room id of the account's most recent session, for ghost-room
    /// detection on the next probe.
    async fn previous_room_id(&self, handle: &str) -> Result<Option<String>> {
        let sessions = self.store.sessions.list_for_account(handle, 1).await?;
        Ok(sessions.into_iter().next().and_then(|s| s.room_id))
    }

    /// Schedule a single recovery probe after the configured delay, at most
    /// one outstanding per handle. A successful (unblocked) probe clears
    /// the block record and kicks the normal chain immediately.
    fn ensure_recovery_probe(self: &Arc<Self>, handle: &str, settings: &MonitorSettings) {
        if !settings.auto_recovery_enabled {
            return;
        }
        if self
            .recovery_pending
            .insert(handle.to_string(), ())
            .is_some()
        {
            return;
        }

        let poller = self.clone();
        let handle = handle.to_string();
        let delay = settings.recovery_test_delay;
        let token = self.shutdown.child_token();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    poller.recovery_pending.remove(&handle);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            let outcome = poller.prober.probe(&handle, None).await;
            poller.recovery_pending.remove(&handle);
            if outcome.blocked {
                debug!(handle, "Recovery probe still blocked");
                return;
            }
            info!(handle, "Recovery probe succeeded, clearing block");
            if let Err(e) = poller.blocks.clear_block(&handle).await {
                warn!(handle, "Failed to clear block after recovery: {}", e);
            }
            poller.schedule(&handle, Duration::ZERO);
        });
    }
}
