//! Monitor events for the notification surface.
//!
//! This module defines events emitted by the monitoring core for
//! consumption by downstream sinks (UI push, webhooks). Delivery is out of
//! this core's concern; the broadcaster is the seam.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::transport::LiveEvent;

/// Events emitted by the monitoring core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MonitorEvent {
    /// A tracked account was detected broadcasting.
    AccountLive {
        handle: String,
        room_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A tracked account went (or was confirmed) offline.
    AccountOffline {
        handle: String,
        session_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A capture session started.
    SessionStarted {
        handle: String,
        session_id: String,
        room_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A capture session ended.
    SessionEnded {
        handle: String,
        session_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A platform block was detected and recorded.
    BlockDetected {
        handle: String,
        block_count: i64,
        cooldown_hours: f64,
        timestamp: DateTime<Utc>,
    },
    /// A previously blocked account recovered.
    BlockCleared { handle: String, timestamp: DateTime<Utc> },
    /// A chat event matched a trigger word.
    AlertTriggered {
        handle: String,
        session_id: String,
        word: String,
        text: String,
        username: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// Raw live event pass-through for real-time observers.
    Live {
        handle: String,
        session_id: String,
        event: LiveEvent,
    },
    /// Monitoring was enabled or disabled for an account.
    MonitoringStateChanged {
        handle: String,
        enabled: bool,
        timestamp: DateTime<Utc>,
    },
}

impl MonitorEvent {
    /// Get a human-readable description of the event.
    pub fn description(&self) -> String {
        match self {
            MonitorEvent::AccountLive { handle, room_id, .. } => {
                format!("{} is now live in room {}", handle, room_id)
            }
            MonitorEvent::AccountOffline { handle, .. } => {
                format!("{} went offline", handle)
            }
            MonitorEvent::SessionStarted { handle, session_id, .. } => {
                format!("Session {} started for {}", session_id, handle)
            }
            MonitorEvent::SessionEnded { handle, session_id, .. } => {
                format!("Session {} ended for {}", session_id, handle)
            }
            MonitorEvent::BlockDetected {
                handle,
                block_count,
                cooldown_hours,
                ..
            } => {
                format!(
                    "{} blocked (count {}), cooling down {}h",
                    handle, block_count, cooldown_hours
                )
            }
            MonitorEvent::BlockCleared { handle, .. } => {
                format!("Block cleared for {}", handle)
            }
            MonitorEvent::AlertTriggered { handle, word, .. } => {
                format!("Trigger word '{}' matched in {}'s chat", word, handle)
            }
            MonitorEvent::Live { handle, event, .. } => {
                format!("{}: {} event", handle, event.kind)
            }
            MonitorEvent::MonitoringStateChanged { handle, enabled, .. } => {
                format!(
                    "Monitoring {} for {}",
                    if *enabled { "enabled" } else { "disabled" },
                    handle
                )
            }
        }
    }

    /// Check if this event should reach the notification sink.
    /// Raw live events are high-volume and stay on the broadcast channel only.
    pub fn should_notify(&self) -> bool {
        !matches!(self, MonitorEvent::Live { .. })
    }
}

/// Broadcaster for monitor events.
pub struct MonitorEventBroadcaster {
    sender: broadcast::Sender<MonitorEvent>,
}

impl MonitorEventBroadcaster {
    /// Create a new broadcaster with default capacity (256).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a new broadcaster with specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to monitor events.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }

    /// Publish a monitor event. Lagging or absent subscribers are not an
    /// error for the publisher.
    pub fn publish(&self, event: MonitorEvent) {
        let _ = self.sender.send(event);
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MonitorEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MonitorEventBroadcaster {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
