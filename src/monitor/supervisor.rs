//! Connection supervision.
//!
//! A [`ConnectionSupervisor`] owns exactly one long-lived transport
//! connection for one account. It reconnects with bounded exponential
//! backoff on transient failures, terminates cleanly on an explicit
//! stream-end signal, and terminates immediately (reporting upward) when a
//! block signature shows up in any error.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transport::{EventKind, LiveEvent, LiveTransport};

/// Cap on the backoff exponent to prevent overflow.
const MAX_BACKOFF_EXPONENT: u32 = 10;

/// Ceiling on a single reconnect delay.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// How the supervisor ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// The platform signalled the broadcast ended. Clean, no failure.
    StreamEnded,
    /// A block signature was detected; the block tracker should record it.
    Blocked { info: String },
    /// Reconnect attempts were exhausted.
    ReconnectExhausted,
    /// The owner asked the supervisor to stop.
    Stopped,
}

/// Events the supervisor reports to its single owner.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// The transport connection is established.
    Connected { room_id: String },
    /// The connection dropped; a reconnect attempt follows.
    Disconnected { reason: String, attempt: u32 },
    /// Pass-through of a raw transport event.
    Event(LiveEvent),
    /// The supervisor is done; no more events will follow.
    Terminated { outcome: TerminationOutcome },
}

/// Reconnect policy for a supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_secs(1),
        }
    }
}

/// Owner-side handle to a running supervisor.
pub struct SupervisorHandle {
    handle: String,
    room_id: String,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
    join: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SupervisorHandle {
    /// Account handle this supervisor is attributed to.
    pub fn account(&self) -> &str {
        &self.handle
    }

    /// Room the supervisor was started against.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Whether the underlying transport connection is currently up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Ask the supervisor to stop and wait for the connection to close.
    /// Idempotent; repeated calls are no-ops.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let join = self.join.lock().take();
        if let Some(join) = join {
            let _ = join.await;
        }
    }
}

/// Supervisor for one account's transport connection.
///
/// State machine: Idle -> Connecting -> Connected ->
/// (Disconnected -> Reconnecting)* -> Terminated.
pub struct ConnectionSupervisor {
    handle: String,
    transport: Arc<dyn LiveTransport>,
    config: SupervisorConfig,
    event_tx: mpsc::Sender<SupervisorEvent>,
}

impl ConnectionSupervisor {
    /// Spawn a supervisor for `handle` against an already-probed room.
    ///
    /// Events flow to `event_tx`; the returned handle controls shutdown and
    /// exposes the live connection state.
    pub fn spawn(
        handle: impl Into<String>,
        room_id: impl Into<String>,
        transport: Arc<dyn LiveTransport>,
        config: SupervisorConfig,
        event_tx: mpsc::Sender<SupervisorEvent>,
    ) -> SupervisorHandle {
        let handle = handle.into();
        let room_id = room_id.into();
        let cancel = CancellationToken::new();
        let connected = Arc::new(AtomicBool::new(false));

        let supervisor = Self {
            handle: handle.clone(),
            transport,
            config,
            event_tx,
        };
        let join = tokio::spawn(supervisor.run(cancel.clone(), connected.clone()));

        SupervisorHandle {
            handle,
            room_id,
            cancel,
            connected,
            join: parking_lot::Mutex::new(Some(join)),
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let multiplier = 2u32.saturating_pow(exponent);
        self.config
            .reconnect_base_delay
            .saturating_mul(multiplier)
            .min(MAX_RECONNECT_DELAY)
    }

    async fn run(self, cancel: CancellationToken, connected: Arc<AtomicBool>) {
        let outcome = self.run_inner(&cancel, &connected).await;
        connected.store(false, Ordering::SeqCst);

        match &outcome {
            TerminationOutcome::StreamEnded => {
                info!(handle = %self.handle, "Supervisor terminated: stream ended")
            }
            TerminationOutcome::Blocked { info } => {
                warn!(handle = %self.handle, %info, "Supervisor terminated: blocked")
            }
            TerminationOutcome::ReconnectExhausted => {
                warn!(handle = %self.handle, "Supervisor terminated: reconnects exhausted")
            }
            TerminationOutcome::Stopped => {
                debug!(handle = %self.handle, "Supervisor terminated: stopped")
            }
        }

        let _ = self
            .event_tx
            .send(SupervisorEvent::Terminated { outcome })
            .await;
    }

    async fn run_inner(
        &self,
        cancel: &CancellationToken,
        connected: &AtomicBool,
    ) -> TerminationOutcome {
        let mut attempt = 0u32;

        'connect: loop {
            if cancel.is_cancelled() {
                return TerminationOutcome::Stopped;
            }

            // Connecting / Reconnecting.
            let mut conn = tokio::select! {
                _ = cancel.cancelled() => return TerminationOutcome::Stopped,
                result = self.transport.connect(&self.handle) => match result {
                    Ok(conn) => conn,
                    Err(e) if e.is_block_signature() => {
                        return TerminationOutcome::Blocked { info: e.to_string() };
                    }
                    Err(e) => {
                        attempt += 1;
                        if attempt > self.config.max_reconnect_attempts {
                            return TerminationOutcome::ReconnectExhausted;
                        }
                        let delay = self.backoff_delay(attempt);
                        debug!(
                            handle = %self.handle,
                            attempt,
                            ?delay,
                            error = %e,
                            "Reconnect attempt failed, backing off"
                        );
                        let _ = self
                            .event_tx
                            .send(SupervisorEvent::Disconnected {
                                reason: e.to_string(),
                                attempt,
                            })
                            .await;
                        tokio::select! {
                            _ = cancel.cancelled() => return TerminationOutcome::Stopped,
                            _ = tokio::time::sleep(delay) => {}
                        }
                        continue 'connect;
                    }
                },
            };

            // Connected.
            attempt = 0;
            connected.store(true, Ordering::SeqCst);
            if self
                .event_tx
                .send(SupervisorEvent::Connected {
                    room_id: conn.room_id.clone(),
                })
                .await
                .is_err()
            {
                // Owner is gone; close the connection and stop.
                let _ = self.transport.disconnect(&mut conn).await;
                return TerminationOutcome::Stopped;
            }

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = self.transport.disconnect(&mut conn).await;
                        return TerminationOutcome::Stopped;
                    }
                    result = self.transport.receive(&mut conn) => match result {
                        Ok(Some(event)) => {
                            if event.kind == EventKind::StreamEnd {
                                let _ = self.transport.disconnect(&mut conn).await;
                                return TerminationOutcome::StreamEnded;
                            }
                            if self
                                .event_tx
                                .send(SupervisorEvent::Event(event))
                                .await
                                .is_err()
                            {
                                let _ = self.transport.disconnect(&mut conn).await;
                                return TerminationOutcome::Stopped;
                            }
                        }
                        Ok(None) => {
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                        Err(e) if e.is_block_signature() => {
                            connected.store(false, Ordering::SeqCst);
                            let _ = self.transport.disconnect(&mut conn).await;
                            return TerminationOutcome::Blocked { info: e.to_string() };
                        }
                        Err(e) => {
                            // Transient drop; fall back to the reconnect loop.
                            connected.store(false, Ordering::SeqCst);
                            let _ = self.transport.disconnect(&mut conn).await;
                            attempt += 1;
                            if attempt > self.config.max_reconnect_attempts {
                                return TerminationOutcome::ReconnectExhausted;
                            }
                            let delay = self.backoff_delay(attempt);
                            debug!(
                                handle = %self.handle,
                                attempt,
                                ?delay,
                                error = %e,
                                "Connection dropped, backing off before reconnect"
                            );
                            let _ = self
                                .event_tx
                                .send(SupervisorEvent::Disconnected {
                                    reason: e.to_string(),
                                    attempt,
                                })
                                .await;
                            tokio::select! {
                                _ = cancel.cancelled() => return TerminationOutcome::Stopped,
                                _ = tokio::time::sleep(delay) => {}
                            }
                            continue 'connect;
                        }
                    },
                }
            }
        }
    }
}
