//! Session lifecycle management.
//!
//! The [`SessionManager`] owns the process-scoped registry of active
//! sessions (one per account handle), starts and stops connection
//! supervisors, and runs one single-consumer task per session that buffers
//! events, coalesces counter updates, takes stats snapshots, and finalizes
//! the session row on termination. `reconcile()` forces persisted state
//! into agreement with the fact that no prior-process connections survive
//! a restart.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::Result;
use crate::alerts::AlertEvaluator;
use crate::config::SettingsService;
use crate::database::models::{LiveSessionDbModel, SessionStatus, StatsSnapshotDbModel};
use crate::database::repositories::Store;
use crate::database::time::now_ms;
use crate::monitor::blocks::BlockTracker;
use crate::monitor::events::{MonitorEvent, MonitorEventBroadcaster};
use crate::monitor::supervisor::{
    ConnectionSupervisor, SupervisorConfig, SupervisorEvent, SupervisorHandle, TerminationOutcome,
};
use crate::session::buffer::{CounterAccumulator, EventBuffer};
use crate::transport::{EventKind, LiveTransport};

/// Capacity of the supervisor -> session task channel.
const SUPERVISOR_CHANNEL_CAPACITY: usize = 256;

/// One entry in the active-session registry.
struct ActiveSession {
    session_id: String,
    supervisor: Arc<SupervisorHandle>,
    task: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Orchestrates start/stop of live capture sessions per account.
pub struct SessionManager {
    store: Store,
    transport: Arc<dyn LiveTransport>,
    settings: Arc<SettingsService>,
    blocks: Arc<BlockTracker>,
    alerts: Arc<AlertEvaluator>,
    broadcaster: MonitorEventBroadcaster,
    /// Registry of active sessions keyed by handle. Cleared by `reconcile()`.
    active: Arc<DashMap<String, ActiveSession>>,
    /// Serializes start/stop transitions for the registry.
    start_lock: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(
        store: Store,
        transport: Arc<dyn LiveTransport>,
        settings: Arc<SettingsService>,
        blocks: Arc<BlockTracker>,
        alerts: Arc<AlertEvaluator>,
        broadcaster: MonitorEventBroadcaster,
    ) -> Self {
        Self {
            store,
            transport,
            settings,
            blocks,
            alerts,
            broadcaster,
            active: Arc::new(DashMap::new()),
            start_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Whether a session is registered for this handle.
    pub fn is_active(&self, handle: &str) -> bool {
        self.active.contains_key(handle)
    }

    /// Whether a supervisor is registered AND its transport connection is up.
    pub fn is_supervisor_connected(&self, handle: &str) -> bool {
        self.active
            .get(handle)
            .map(|entry| entry.supervisor.is_connected())
            .unwrap_or(false)
    }

    /// Session id of the active session for this handle, if any.
    pub fn active_session_id(&self, handle: &str) -> Option<String> {
        self.active.get(handle).map(|entry| entry.session_id.clone())
    }

    /// Number of active sessions.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Subscribe to monitor events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<MonitorEvent> {
        self.broadcaster.subscribe()
    }

    /// Start capturing a live session for `handle` in `room_id`.
    ///
    /// No-op when a session is already active for the handle, so duplicate
    /// liveness detections cannot double-start.
    pub async fn start_monitoring(&self, handle: &str, room_id: &str) -> Result<()> {
        let _guard = self.start_lock.lock().await;

        if self.active.contains_key(handle) {
            debug!(handle, "start_monitoring ignored: session already active");
            return Ok(());
        }

        let settings = self.settings.current().await;

        // Session row first; event inserts are foreign-key-checked against it.
        let session = LiveSessionDbModel::new(handle, Some(room_id.to_string()));
        self.store.sessions.create(&session).await?;
        self.store
            .accounts
            .set_current_session(handle, Some(&session.id))
            .await?;
        self.store.accounts.touch_live(handle, now_ms()).await?;

        let (event_tx, event_rx) = mpsc::channel(SUPERVISOR_CHANNEL_CAPACITY);
        let supervisor = Arc::new(ConnectionSupervisor::spawn(
            handle,
            room_id,
            self.transport.clone(),
            SupervisorConfig {
                max_reconnect_attempts: settings.max_reconnect_attempts,
                reconnect_base_delay: settings.reconnect_base_delay,
            },
            event_tx,
        ));

        self.active.insert(
            handle.to_string(),
            ActiveSession {
                session_id: session.id.clone(),
                supervisor,
                task: parking_lot::Mutex::new(None),
            },
        );

        let task = SessionTask {
            handle: handle.to_string(),
            session_id: session.id.clone(),
            store: self.store.clone(),
            broadcaster: self.broadcaster.clone(),
            alerts: self.alerts.clone(),
            blocks: self.blocks.clone(),
            auto_cooldown: settings.auto_cooldown_enabled,
            registry: self.active.clone(),
            buffer: EventBuffer::new(session.id.as_str(), settings.event_buffer_ceiling),
            counters: CounterAccumulator::new(),
        };
        let join = tokio::spawn(task.run(
            event_rx,
            settings.event_flush_interval,
            settings.counter_flush_interval,
            settings.snapshot_interval,
        ));
        if let Some(entry) = self.active.get(handle) {
            *entry.task.lock() = Some(join);
        }

        info!(handle, session_id = %session.id, room_id, "Started session monitoring");
        self.broadcaster.publish(MonitorEvent::SessionStarted {
            handle: handle.to_string(),
            session_id: session.id,
            room_id: room_id.to_string(),
            timestamp: Utc::now(),
        });

        Ok(())
    }

    /// Stop capturing for `handle`.
    ///
    /// Forces a final flush of buffered events and counters, marks the
    /// session ended, and clears the account's session pointer. Returns
    /// after the session task has fully finalized, so buffered state is
    /// durable when this call completes. No-op for unknown handles.
    pub async fn stop_monitoring(&self, handle: &str) -> Result<()> {
        let _guard = self.start_lock.lock().await;

        let Some((_, entry)) = self.active.remove(handle) else {
            debug!(handle, "stop_monitoring ignored: no active session");
            return Ok(());
        };

        info!(handle, session_id = %entry.session_id, "Stopping session monitoring");
        entry.supervisor.shutdown().await;

        let join = entry.task.lock().take();
        if let Some(join) = join {
            if let Err(e) = join.await {
                warn!(handle, "Session task join failed: {}", e);
            }
        }
        Ok(())
    }

    /// Stop every active session (graceful shutdown path).
    pub async fn stop_all(&self) {
        let handles: Vec<String> = self.active.iter().map(|e| e.key().clone()).collect();
        for handle in handles {
            if let Err(e) = self.stop_monitoring(&handle).await {
                warn!(handle, "Failed to stop session: {}", e);
            }
        }
    }

    /// Startup reconciliation; run once before polling resumes.
    ///
    /// A restarted process owns no transport connections, so: the in-memory
    /// registry is cleared unconditionally, every persisted session pointer
    /// is nulled (stamping the post-session cooldown anchor so the poller
    /// does not reconnect into a lingering room), and every session row
    /// still marked LIVE gets a final stats snapshot and is force-ended.
    pub async fn reconcile(&self) -> Result<()> {
        self.active.clear();
        let now = now_ms();

        let stale_accounts = self.store.accounts.list_with_session_pointer().await?;
        for account in &stale_accounts {
            debug!(
                handle = %account.handle,
                session_id = ?account.current_live_session_id,
                "Clearing stale session pointer"
            );
            self.store
                .accounts
                .clear_session_pointer(&account.handle, now)
                .await?;
        }

        let stale_sessions = self.store.sessions.list_live().await?;
        let end_time = Utc::now().to_rfc3339();
        for session in &stale_sessions {
            if let Some(stats) = self.store.sessions.get_stats(&session.id).await? {
                self.store
                    .events
                    .insert_snapshot(&StatsSnapshotDbModel::new(session.id.as_str(), stats))
                    .await?;
            }
            self.store
                .sessions
                .end_session(&session.id, &end_time, SessionStatus::Ended)
                .await?;
        }

        if !stale_accounts.is_empty() || !stale_sessions.is_empty() {
            info!(
                stale_pointers = stale_accounts.len(),
                stale_sessions = stale_sessions.len(),
                "Reconciled state left over from a previous process"
            );
        }
        Ok(())
    }
}

/// Single consumer of one supervisor's event stream.
///
/// Owning all buffers and flush timers in one task keeps per-session event
/// ordering and serializes counter flushes without locks.
struct SessionTask {
    handle: String,
    session_id: String,
    store: Store,
    broadcaster: MonitorEventBroadcaster,
    alerts: Arc<AlertEvaluator>,
    blocks: Arc<BlockTracker>,
    auto_cooldown: bool,
    registry: Arc<DashMap<String, ActiveSession>>,
    buffer: EventBuffer,
    counters: CounterAccumulator,
}

impl SessionTask {
    async fn run(
        mut self,
        mut event_rx: mpsc::Receiver<SupervisorEvent>,
        event_flush_interval: Duration,
        counter_flush_interval: Duration,
        snapshot_interval: Duration,
    ) {
        let start = tokio::time::Instant::now();
        let mut event_flush =
            tokio::time::interval_at(start + event_flush_interval, event_flush_interval);
        let mut counter_flush =
            tokio::time::interval_at(start + counter_flush_interval, counter_flush_interval);
        let mut snapshot = tokio::time::interval_at(start + snapshot_interval, snapshot_interval);
        event_flush.set_missed_tick_behavior(MissedTickBehavior::Skip);
        counter_flush.set_missed_tick_behavior(MissedTickBehavior::Skip);
        snapshot.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let status = loop {
            tokio::select! {
                maybe_event = event_rx.recv() => match maybe_event {
                    Some(SupervisorEvent::Connected { room_id }) => {
                        debug!(handle = %self.handle, room_id, "Supervisor connected");
                    }
                    Some(SupervisorEvent::Disconnected { reason, attempt }) => {
                        debug!(
                            handle = %self.handle,
                            reason,
                            attempt,
                            "Supervisor reconnecting"
                        );
                    }
                    Some(SupervisorEvent::Event(event)) => {
                        self.handle_event(event);
                    }
                    Some(SupervisorEvent::Terminated { outcome }) => {
                        break self.status_for(outcome).await;
                    }
                    None => break SessionStatus::Ended,
                },
                _ = event_flush.tick() => self.flush_events().await,
                _ = counter_flush.tick() => self.flush_counters().await,
                _ = snapshot.tick() => self.take_snapshot().await,
            }
        };

        self.finalize(status).await;
    }

    fn handle_event(&mut self, event: crate::transport::LiveEvent) {
        // Fan out to real-time observers before persistence.
        self.broadcaster.publish(MonitorEvent::Live {
            handle: self.handle.clone(),
            session_id: self.session_id.clone(),
            event: event.clone(),
        });
        if event.kind == EventKind::Chat {
            self.alerts.evaluate(&self.handle, &self.session_id, &event);
        }
        self.counters.apply(&event);
        self.buffer.push(&event);
    }

    async fn status_for(&self, outcome: TerminationOutcome) -> SessionStatus {
        match outcome {
            TerminationOutcome::StreamEnded | TerminationOutcome::Stopped => SessionStatus::Ended,
            TerminationOutcome::ReconnectExhausted => SessionStatus::ConnectionFailed,
            TerminationOutcome::Blocked { info } => {
                if self.auto_cooldown {
                    if let Err(e) = self.blocks.record_block(&self.handle, &info).await {
                        warn!(handle = %self.handle, "Failed to record block: {}", e);
                    }
                }
                SessionStatus::ConnectionFailed
            }
        }
    }

    /// Flush buffered events to the store.
    ///
    /// Re-verifies the session row first: when it is genuinely gone the
    /// buffered rows are discarded with a warning, while transient store
    /// errors re-buffer them for the next cycle.
    async fn flush_events(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let rows = self.buffer.take();

        match self.store.sessions.exists(&self.session_id).await {
            Ok(true) => {
                let count = rows.len();
                if let Err(e) = self.store.events.insert_events(&rows).await {
                    warn!(
                        session_id = %self.session_id,
                        count,
                        "Event flush failed, re-buffering: {}",
                        e
                    );
                    self.buffer.restore(rows);
                }
            }
            Ok(false) => {
                warn!(
                    session_id = %self.session_id,
                    discarded = rows.len(),
                    "Session row is gone, discarding buffered events"
                );
            }
            Err(e) => {
                warn!(
                    session_id = %self.session_id,
                    "Session existence check failed, re-buffering: {}",
                    e
                );
                self.buffer.restore(rows);
            }
        }
    }

    /// Flush coalesced counter increments to the session row.
    async fn flush_counters(&mut self) {
        let Some(delta) = self.counters.take() else {
            return;
        };
        if let Err(e) = self
            .store
            .sessions
            .apply_stats_delta(&self.session_id, &delta)
            .await
        {
            warn!(
                session_id = %self.session_id,
                "Counter flush failed, re-accumulating: {}",
                e
            );
            self.counters.restore(delta);
        }
    }

    /// Take a full-copy stats snapshot. Counters are flushed first so the
    /// snapshot reflects every increment applied so far.
    async fn take_snapshot(&mut self) {
        self.flush_counters().await;
        match self.store.sessions.get_stats(&self.session_id).await {
            Ok(Some(stats)) => {
                let snapshot = StatsSnapshotDbModel::new(self.session_id.as_str(), stats);
                if let Err(e) = self.store.events.insert_snapshot(&snapshot).await {
                    warn!(session_id = %self.session_id, "Snapshot insert failed: {}", e);
                }
            }
            Ok(None) => {
                debug!(session_id = %self.session_id, "Session row gone, skipping snapshot");
            }
            Err(e) => {
                warn!(session_id = %self.session_id, "Snapshot stats read failed: {}", e);
            }
        }
    }

    /// Final flush, final snapshot, terminal row updates, registry cleanup.
    async fn finalize(mut self, status: SessionStatus) {
        self.flush_events().await;
        self.take_snapshot().await;

        let end_time = Utc::now().to_rfc3339();
        if let Err(e) = self
            .store
            .sessions
            .end_session(&self.session_id, &end_time, status)
            .await
        {
            warn!(session_id = %self.session_id, "Failed to end session row: {}", e);
        }
        if let Err(e) = self
            .store
            .accounts
            .clear_session_pointer(&self.handle, now_ms())
            .await
        {
            warn!(handle = %self.handle, "Failed to clear session pointer: {}", e);
        }

        // Self-removal covers terminations the manager did not initiate
        // (stream end, block, reconnect exhaustion).
        let session_id = self.session_id.clone();
        self.registry
            .remove_if(&self.handle, |_, entry| entry.session_id == session_id);

        info!(
            handle = %self.handle,
            session_id = %self.session_id,
            status = %status.as_str(),
            "Session finalized"
        );
        self.broadcaster.publish(MonitorEvent::SessionEnded {
            handle: self.handle.clone(),
            session_id: self.session_id.clone(),
            timestamp: Utc::now(),
        });
    }
}
