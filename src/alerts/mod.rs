//! Keyword-triggered alerts.
//!
//! Chat events are matched against configured trigger words; a match raises
//! an [`MonitorEvent::AlertTriggered`] on the broadcast channel. Delivery
//! beyond the channel (UI push, notification fan-out) is not this module's
//! concern.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;

use crate::Result;
use crate::database::repositories::TriggerWordRepository;
use crate::monitor::events::{MonitorEvent, MonitorEventBroadcaster};
use crate::transport::LiveEvent;

/// Evaluates chat events against the configured trigger words.
pub struct AlertEvaluator {
    triggers: Arc<dyn TriggerWordRepository>,
    broadcaster: MonitorEventBroadcaster,
    /// Lowercased enabled words.
    words: RwLock<Vec<String>>,
}

impl AlertEvaluator {
    pub fn new(
        triggers: Arc<dyn TriggerWordRepository>,
        broadcaster: MonitorEventBroadcaster,
    ) -> Self {
        Self {
            triggers,
            broadcaster,
            words: RwLock::new(Vec::new()),
        }
    }

    /// Reload the enabled word list from the store.
    pub async fn reload(&self) -> Result<()> {
        let words: Vec<String> = self
            .triggers
            .list_enabled()
            .await?
            .into_iter()
            .map(|w| w.word.to_lowercase())
            .collect();
        debug!(count = words.len(), "Loaded trigger words");
        *self.words.write() = words;
        Ok(())
    }

    /// First trigger word contained in `text`, case-insensitive.
    pub fn first_match(&self, text: &str) -> Option<String> {
        let lower = text.to_lowercase();
        self.words
            .read()
            .iter()
            .find(|word| lower.contains(word.as_str()))
            .cloned()
    }

    /// Evaluate a live event; publishes an alert when a chat message
    /// contains a trigger word. Non-chat events are ignored.
    pub fn evaluate(&self, handle: &str, session_id: &str, event: &LiveEvent) {
        let Some(text) = event.chat_text() else {
            return;
        };
        if let Some(word) = self.first_match(text) {
            self.broadcaster.publish(MonitorEvent::AlertTriggered {
                handle: handle.to_string(),
                session_id: session_id.to_string(),
                word,
                text: text.to_string(),
                username: event.user.as_ref().map(|u| u.username.clone()),
                timestamp: Utc::now(),
            });
        }
    }
}
