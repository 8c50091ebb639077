//! Connection block tracking.
//!
//! Records platform-imposed connectivity blocks per account and computes
//! exponential-backoff cooldown windows. One active record per account;
//! cleared on confirmed recovery.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::Result;
use crate::config::SettingsService;
use crate::database::models::BlockRecordDbModel;
use crate::database::repositories::BlockRepository;
use crate::database::time::now_ms;
use crate::monitor::events::{MonitorEvent, MonitorEventBroadcaster};

/// Cap on the cooldown exponent to prevent overflow.
const MAX_EXPONENT: i64 = 30;

/// Tracks platform blocks and their cooldown windows.
pub struct BlockTracker {
    blocks: Arc<dyn BlockRepository>,
    settings: Arc<SettingsService>,
    broadcaster: MonitorEventBroadcaster,
}

impl BlockTracker {
    pub fn new(
        blocks: Arc<dyn BlockRepository>,
        settings: Arc<SettingsService>,
        broadcaster: MonitorEventBroadcaster,
    ) -> Self {
        Self {
            blocks,
            settings,
            broadcaster,
        }
    }

    /// Cooldown length for the n-th consecutive block:
    /// `min(max_hours, base_hours * 2^(count-1))`.
    pub fn cooldown_hours(base_hours: f64, max_hours: f64, count: i64) -> f64 {
        let exponent = (count - 1).clamp(0, MAX_EXPONENT) as i32;
        (base_hours * 2f64.powi(exponent)).min(max_hours)
    }

    /// Record a detected block and start (or extend) the cooldown window.
    pub async fn record_block(
        &self,
        handle: &str,
        error_info: &str,
    ) -> Result<BlockRecordDbModel> {
        let settings = self.settings.current().await;
        let now = now_ms();

        let previous = self.blocks.get(handle).await?;
        let (first_blocked_at, block_count) = match &previous {
            Some(rec) => (rec.first_blocked_at, rec.block_count + 1),
            None => (now, 1),
        };

        let cooldown_hours = Self::cooldown_hours(
            settings.cooldown_base_hours,
            settings.cooldown_max_hours,
            block_count,
        );
        let cooldown_until = now + (cooldown_hours * 3_600_000.0) as i64;

        let record = BlockRecordDbModel {
            account_handle: handle.to_string(),
            first_blocked_at,
            last_blocked_at: now,
            block_count,
            cooldown_until,
            cooldown_hours,
            // A fresh block supersedes any prior operator acknowledgement.
            dismissed: false,
            last_error: Some(error_info.to_string()),
        };
        self.blocks.upsert(&record).await?;

        warn!(
            handle,
            block_count, cooldown_hours, "Recorded platform block"
        );
        self.broadcaster.publish(MonitorEvent::BlockDetected {
            handle: handle.to_string(),
            block_count,
            cooldown_hours,
            timestamp: Utc::now(),
        });

        Ok(record)
    }

    /// Whether the account is inside an active cooldown window.
    pub async fn is_in_cooldown(&self, handle: &str) -> Result<bool> {
        Ok(self
            .blocks
            .get(handle)
            .await?
            .map(|rec| rec.is_in_cooldown(now_ms()))
            .unwrap_or(false))
    }

    /// Remaining cooldown, `None` when no active window.
    pub async fn remaining_cooldown(&self, handle: &str) -> Result<Option<Duration>> {
        let record = self.blocks.get(handle).await?;
        Ok(record.and_then(|rec| {
            let remaining = rec.remaining_ms(now_ms());
            (remaining > 0).then(|| Duration::from_millis(remaining as u64))
        }))
    }

    /// Clear the active record after a confirmed recovery (a later probe
    /// succeeded without a block signal).
    pub async fn clear_block(&self, handle: &str) -> Result<()> {
        if self.blocks.get(handle).await?.is_some() {
            self.blocks.delete(handle).await?;
            info!(handle, "Cleared block record after recovery");
            self.broadcaster.publish(MonitorEvent::BlockCleared {
                handle: handle.to_string(),
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    /// Operator acknowledgement; the cooldown timer keeps running.
    pub async fn dismiss_warning(&self, handle: &str) -> Result<()> {
        self.blocks.set_dismissed(handle, true).await
    }
}
