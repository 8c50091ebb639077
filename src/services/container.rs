//! Service container for dependency injection.
//!
//! The ServiceContainer wires the monitoring engine together: store,
//! settings, block tracker, alert evaluator, session manager, and poller,
//! and manages their lifecycle from reconciliation to shutdown.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::Result;
use crate::alerts::AlertEvaluator;
use crate::config::SettingsService;
use crate::database::repositories::Store;
use crate::monitor::blocks::BlockTracker;
use crate::monitor::events::{MonitorEvent, MonitorEventBroadcaster};
use crate::monitor::poller::AccountPoller;
use crate::monitor::prober::LivenessProber;
use crate::session::SessionManager;
use crate::transport::LiveTransport;

/// Default settings cache TTL.
const DEFAULT_SETTINGS_TTL: Duration = Duration::from_secs(30);

/// Default event channel capacity.
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Service container holding the monitoring engine.
pub struct ServiceContainer {
    /// Database connection pool.
    pub pool: SqlitePool,
    /// Repository bundle.
    pub store: Store,
    /// Cached settings provider.
    pub settings: Arc<SettingsService>,
    /// Block tracker.
    pub blocks: Arc<BlockTracker>,
    /// Alert evaluator.
    pub alerts: Arc<AlertEvaluator>,
    /// Session lifecycle manager.
    pub sessions: Arc<SessionManager>,
    /// Account poller.
    pub poller: Arc<AccountPoller>,
    /// Monitor event broadcaster (shared between services).
    pub broadcaster: MonitorEventBroadcaster,
}

impl ServiceContainer {
    /// Create a new service container with default configuration.
    pub fn new(pool: SqlitePool, transport: Arc<dyn LiveTransport>) -> Self {
        Self::with_config(pool, transport, DEFAULT_SETTINGS_TTL, DEFAULT_EVENT_CAPACITY)
    }

    /// Create a new service container with custom cache TTL and channel
    /// capacity.
    pub fn with_config(
        pool: SqlitePool,
        transport: Arc<dyn LiveTransport>,
        settings_ttl: Duration,
        event_capacity: usize,
    ) -> Self {
        info!("Initializing service container");

        let store = Store::new(pool.clone());
        let broadcaster = MonitorEventBroadcaster::with_capacity(event_capacity);
        let settings = Arc::new(SettingsService::with_ttl(
            store.settings.clone(),
            settings_ttl,
        ));
        let blocks = Arc::new(BlockTracker::new(
            store.blocks.clone(),
            settings.clone(),
            broadcaster.clone(),
        ));
        let alerts = Arc::new(AlertEvaluator::new(
            store.triggers.clone(),
            broadcaster.clone(),
        ));
        let prober = Arc::new(LivenessProber::new(transport.clone(), settings.clone()));
        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            transport,
            settings.clone(),
            blocks.clone(),
            alerts.clone(),
            broadcaster.clone(),
        ));
        let poller = Arc::new(AccountPoller::new(
            store.clone(),
            settings.clone(),
            prober,
            blocks.clone(),
            sessions.clone(),
            broadcaster.clone(),
        ));

        Self {
            pool,
            store,
            settings,
            blocks,
            alerts,
            sessions,
            poller,
            broadcaster,
        }
    }

    /// Bring the engine up: load trigger words, reconcile persisted state
    /// against the fresh process, then start polling enabled accounts.
    /// Returns the number of accounts scheduled.
    pub async fn start(&self) -> Result<usize> {
        if let Err(e) = self.alerts.reload().await {
            warn!("Failed to load trigger words: {}", e);
        }
        self.sessions.reconcile().await?;
        self.poller.bootstrap().await
    }

    /// Subscribe to monitor events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<MonitorEvent> {
        self.broadcaster.subscribe()
    }

    /// Graceful shutdown: cancel polling, then stop every active session
    /// (final flushes included).
    pub async fn shutdown(&self) {
        info!("Shutting down service container");
        self.poller.shutdown();
        self.sessions.stop_all().await;
    }
}
