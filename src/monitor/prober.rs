//! Liveness probing.
//!
//! Determines whether an account is actually broadcasting right now using a
//! two-phase connect+observe protocol against the transport. The probe is
//! deliberately biased toward "offline": ambiguous errors never block the
//! poll loop, and weak signals alone never count as live (ghost rooms emit
//! them too).

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::SettingsService;
use crate::transport::{EventKind, LiveTransport};

/// Why a probe reached its verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeReason {
    /// At least one strong interaction signal arrived in the window.
    StrongSignal,
    /// Nothing arrived in the window.
    NoSignals,
    /// Only viewer-count style signals arrived.
    OnlyWeakSignals,
    /// The room id matched the previous session's room and only weak
    /// signals arrived - a lingering ghost room.
    GhostRoomSuspected,
    /// The stream-end marker arrived during observation.
    StreamEnded,
    /// The connect phase failed with an ordinary error.
    ConnectFailed,
    /// The platform blocked the connection.
    Blocked,
}

/// Result of a liveness probe.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub is_live: bool,
    pub room_id: Option<String>,
    pub blocked: bool,
    pub reason: ProbeReason,
    pub strong_signals: u32,
    pub weak_signals: u32,
}

impl ProbeOutcome {
    fn not_live(reason: ProbeReason) -> Self {
        Self {
            is_live: false,
            room_id: None,
            blocked: false,
            reason,
            strong_signals: 0,
            weak_signals: 0,
        }
    }

    fn blocked() -> Self {
        Self {
            is_live: false,
            room_id: None,
            blocked: true,
            reason: ProbeReason::Blocked,
            strong_signals: 0,
            weak_signals: 0,
        }
    }
}

/// Liveness prober for tracked accounts.
pub struct LivenessProber {
    transport: Arc<dyn LiveTransport>,
    settings: Arc<SettingsService>,
}

impl LivenessProber {
    pub fn new(transport: Arc<dyn LiveTransport>, settings: Arc<SettingsService>) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// Probe whether `handle` is currently broadcasting.
    ///
    /// Opens a short-lived transport connection, observes events for up to
    /// the configured window (with a minimum dwell so a quiet-but-live room
    /// gets a chance), and always tears the connection down before
    /// returning. When `previous_room_id` matches the connected room, a
    /// strong signal is required no matter how many weak signals arrive.
    pub async fn probe(&self, handle: &str, previous_room_id: Option<&str>) -> ProbeOutcome {
        let settings = self.settings.current().await;

        // Connect phase. Block signatures are terminal for this call; any
        // other failure reads as "not live".
        let mut conn = match self.transport.connect(handle).await {
            Ok(conn) => conn,
            Err(e) if e.is_block_signature() => {
                warn!(handle, error = %e, "Probe connect blocked by platform");
                return ProbeOutcome::blocked();
            }
            Err(e) => {
                debug!(handle, error = %e, "Probe connect failed, treating as offline");
                return ProbeOutcome::not_live(ProbeReason::ConnectFailed);
            }
        };

        let room_id = conn.room_id.clone();
        let room_reused = previous_room_id == Some(room_id.as_str());
        if room_reused {
            debug!(handle, room_id, "Probe reconnected into the previous room id");
        }

        // Observe phase.
        let started = Instant::now();
        let deadline = started + settings.probe_timeout;
        let min_dwell_until = started + settings.probe_min_dwell;

        let mut strong_signals = 0u32;
        let mut weak_signals = 0u32;
        let mut blocked = false;
        let mut stream_ended = false;

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            // A strong signal settles the verdict, but we hold the minimum
            // dwell so short bursts right after connect are not the only
            // thing we ever see.
            if strong_signals > 0 && now >= min_dwell_until {
                break;
            }

            match tokio::time::timeout(deadline - now, self.transport.receive(&mut conn)).await {
                // Window exhausted while waiting.
                Err(_) => break,
                Ok(Ok(Some(event))) => {
                    if event.kind == EventKind::StreamEnd {
                        stream_ended = true;
                        break;
                    } else if event.kind.is_strong_signal() {
                        strong_signals += 1;
                    } else if event.kind.is_weak_signal() {
                        weak_signals += 1;
                    }
                }
                Ok(Ok(None)) => {
                    // Stream idle; back off briefly before polling again.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Ok(Err(e)) => {
                    if e.is_block_signature() {
                        warn!(handle, error = %e, "Block signature during probe observation");
                        blocked = true;
                    } else {
                        debug!(handle, error = %e, "Transport error during probe observation");
                    }
                    break;
                }
            }
        }

        // Teardown always happens before the verdict leaves this function.
        if let Err(e) = self.transport.disconnect(&mut conn).await {
            debug!(handle, error = %e, "Probe disconnect failed");
        }

        if blocked {
            return ProbeOutcome::blocked();
        }

        let is_live = strong_signals > 0 && !stream_ended;
        let reason = if stream_ended {
            ProbeReason::StreamEnded
        } else if is_live {
            ProbeReason::StrongSignal
        } else if weak_signals > 0 && room_reused {
            ProbeReason::GhostRoomSuspected
        } else if weak_signals > 0 {
            ProbeReason::OnlyWeakSignals
        } else {
            ProbeReason::NoSignals
        };

        debug!(
            handle,
            room_id,
            is_live,
            strong_signals,
            weak_signals,
            ?reason,
            "Probe completed"
        );

        ProbeOutcome {
            is_live,
            room_id: Some(room_id),
            blocked: false,
            reason,
            strong_signals,
            weak_signals,
        }
    }
}
