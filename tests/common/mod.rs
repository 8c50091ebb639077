//! Shared test fixtures: in-memory database setup and a scriptable
//! transport.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use livewatch::database::repositories::Store;
use livewatch::database::{self, DbPool};
use livewatch::services::ServiceContainer;
use livewatch::transport::{
    LiveEvent, LiveTransport, TransportConnection, TransportError, TransportResult,
};

/// Single-connection in-memory pool. One connection keeps the in-memory
/// database alive and shared for the whole test.
pub async fn test_pool() -> DbPool {
    let pool = database::init_pool_with_size("sqlite::memory:", 1)
        .await
        .expect("pool");
    database::run_migrations(&pool).await.expect("migrations");
    pool
}

/// Shrink timing-sensitive settings so tests run fast.
pub async fn apply_fast_settings(store: &Store) {
    for (key, value) in [
        ("probe_timeout_secs", "1"),
        ("probe_min_dwell_secs", "0"),
        ("event_flush_interval_secs", "1"),
        ("counter_flush_interval_secs", "1"),
        ("snapshot_interval_secs", "2"),
        ("quick_retry_enabled", "false"),
        ("check_jitter_secs", "0"),
    ] {
        store.settings.set(key, value).await.expect("setting");
    }
}

/// Build a container with a zero-TTL settings cache so setting changes are
/// visible immediately.
pub fn test_container(pool: DbPool, transport: Arc<MockTransport>) -> ServiceContainer {
    ServiceContainer::with_config(pool, transport, Duration::ZERO, 256)
}

/// Scriptable transport: connects succeed (or fail with queued errors) and
/// `receive` drains a shared feed, parking when the feed is empty.
pub struct MockTransport {
    room_id: Mutex<String>,
    connect_errors: Mutex<VecDeque<TransportError>>,
    connects: AtomicUsize,
    feed_tx: mpsc::UnboundedSender<TransportResult<Option<LiveEvent>>>,
    feed_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<TransportResult<Option<LiveEvent>>>>,
}

impl MockTransport {
    pub fn new(room_id: &str) -> Arc<Self> {
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            room_id: Mutex::new(room_id.to_string()),
            connect_errors: Mutex::new(VecDeque::new()),
            connects: AtomicUsize::new(0),
            feed_tx,
            feed_rx: tokio::sync::Mutex::new(feed_rx),
        })
    }

    /// Queue an event for the next `receive` call.
    pub fn feed_event(&self, event: LiveEvent) {
        let _ = self.feed_tx.send(Ok(Some(event)));
    }

    /// Queue a receive error.
    pub fn feed_error(&self, error: TransportError) {
        let _ = self.feed_tx.send(Err(error));
    }

    /// Make the next `connect` call fail with this error.
    pub fn fail_next_connect(&self, error: TransportError) {
        self.connect_errors.lock().push_back(error);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveTransport for MockTransport {
    async fn connect(&self, _handle: &str) -> TransportResult<TransportConnection> {
        if let Some(error) = self.connect_errors.lock().pop_front() {
            return Err(error);
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(TransportConnection::new(self.room_id.lock().clone()))
    }

    async fn receive(
        &self,
        _conn: &mut TransportConnection,
    ) -> TransportResult<Option<LiveEvent>> {
        let mut rx = self.feed_rx.lock().await;
        match rx.recv().await {
            Some(item) => item,
            None => Err(TransportError::ConnectionClosed("feed closed".to_string())),
        }
    }

    async fn disconnect(&self, conn: &mut TransportConnection) -> TransportResult<()> {
        conn.set_disconnected();
        Ok(())
    }
}
