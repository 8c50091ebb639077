//! Settings service with TTL caching.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::warn;

use crate::config::MonitorSettings;
use crate::database::repositories::SettingsRepository;

/// Default TTL for the cached settings view (30 seconds).
const DEFAULT_TTL: Duration = Duration::from_secs(30);

struct CacheEntry {
    settings: MonitorSettings,
    loaded_at: Instant,
}

/// Cached, DB-backed settings provider.
///
/// Every scheduling decision re-reads through this service; the short TTL
/// keeps the store traffic bounded while letting config edits take effect
/// on the next cycle.
pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
    cache: RwLock<Option<CacheEntry>>,
    ttl: Duration,
}

impl SettingsService {
    pub fn new(repo: Arc<dyn SettingsRepository>) -> Self {
        Self::with_ttl(repo, DEFAULT_TTL)
    }

    pub fn with_ttl(repo: Arc<dyn SettingsRepository>, ttl: Duration) -> Self {
        Self {
            repo,
            cache: RwLock::new(None),
            ttl,
        }
    }

    /// Get the current settings, reloading from the store when the cached
    /// view has expired. Store failures fall back to the last good view,
    /// or defaults when nothing was ever loaded.
    pub async fn current(&self) -> MonitorSettings {
        {
            let cache = self.cache.read();
            if let Some(entry) = cache.as_ref() {
                if entry.loaded_at.elapsed() < self.ttl {
                    return entry.settings.clone();
                }
            }
        }

        match self.repo.all().await {
            Ok(map) => {
                let settings = MonitorSettings::from_map(&map);
                *self.cache.write() = Some(CacheEntry {
                    settings: settings.clone(),
                    loaded_at: Instant::now(),
                });
                settings
            }
            Err(e) => {
                warn!("Failed to load settings, using last known values: {}", e);
                self.cache
                    .read()
                    .as_ref()
                    .map(|entry| entry.settings.clone())
                    .unwrap_or_default()
            }
        }
    }

    /// Drop the cached view so the next read hits the store.
    pub fn invalidate(&self) {
        *self.cache.write() = None;
    }
}
