//! Per-session buffering.
//!
//! Events are appended to an in-memory buffer and flushed to the store on a
//! fixed cadence or at session end, never per-event. Counter increments are
//! coalesced the same way. Both buffers have a single owner (the session
//! task), which serializes flushes without locking.

use tracing::warn;

use crate::database::models::{LiveEventDbModel, SessionStats};
use crate::transport::{EventKind, LiveEvent};

/// Ordered buffer of events awaiting a flush.
pub struct EventBuffer {
    session_id: String,
    buffer: Vec<LiveEventDbModel>,
    /// Ceiling on buffered rows; beyond it the oldest rows are dropped so a
    /// store outage cannot grow memory without bound.
    ceiling: usize,
    dropped: u64,
}

impl EventBuffer {
    pub fn new(session_id: impl Into<String>, ceiling: usize) -> Self {
        Self {
            session_id: session_id.into(),
            buffer: Vec::new(),
            ceiling,
            dropped: 0,
        }
    }

    /// Append an event in arrival order.
    pub fn push(&mut self, event: &LiveEvent) {
        self.buffer
            .push(LiveEventDbModel::from_live_event(
                self.session_id.as_str(),
                event,
            ));
        self.enforce_ceiling();
    }

    /// Take the buffered rows for a flush, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<LiveEventDbModel> {
        std::mem::take(&mut self.buffer)
    }

    /// Put rows back after a transient flush failure. Restored rows precede
    /// anything that arrived during the flush, preserving order.
    pub fn restore(&mut self, mut rows: Vec<LiveEventDbModel>) {
        rows.append(&mut self.buffer);
        self.buffer = rows;
        self.enforce_ceiling();
    }

    fn enforce_ceiling(&mut self) {
        if self.buffer.len() > self.ceiling {
            let overflow = self.buffer.len() - self.ceiling;
            self.buffer.drain(..overflow);
            self.dropped += overflow as u64;
            warn!(
                session_id = %self.session_id,
                overflow,
                total_dropped = self.dropped,
                "Event buffer ceiling reached, dropped oldest rows"
            );
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Rows dropped due to the ceiling (for diagnostics).
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Coalesced counter increments since the last flush.
#[derive(Default)]
pub struct CounterAccumulator {
    delta: SessionStats,
    dirty: bool,
}

impl CounterAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event's counter contribution.
    pub fn apply(&mut self, event: &LiveEvent) {
        match event.kind {
            EventKind::Chat => self.delta.total_messages += 1,
            EventKind::Gift => self.delta.total_gifts += 1,
            EventKind::Like => self.delta.total_likes += 1,
            EventKind::Member => self.delta.total_joins += 1,
            EventKind::Follow => self.delta.total_follows += 1,
            EventKind::Share => self.delta.total_shares += 1,
            EventKind::Repost => self.delta.total_reposts += 1,
            EventKind::Leave => self.delta.total_leaves += 1,
            EventKind::Subscribe => self.delta.total_subscribes += 1,
            EventKind::Emote => self.delta.total_emotes += 1,
            EventKind::RoomUser => {
                // Watermark, not an increment.
                if let Some(count) = event.viewer_count() {
                    self.delta.peak_viewers = self.delta.peak_viewers.max(count);
                }
            }
            EventKind::Social | EventKind::LiveIntro | EventKind::StreamEnd => {}
        }
        self.dirty = true;
    }

    /// Take the accumulated delta for a flush; `None` when nothing changed.
    pub fn take(&mut self) -> Option<SessionStats> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(std::mem::take(&mut self.delta))
    }

    /// Merge a delta back after a failed flush.
    pub fn restore(&mut self, delta: SessionStats) {
        self.delta.merge(&delta);
        self.dirty = true;
    }
}
