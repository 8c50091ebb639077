//! Database repositories.

mod account;
mod block;
mod event;
mod session;
mod settings;
mod trigger;

pub use account::{AccountRepository, SqlxAccountRepository};
pub use block::{BlockRepository, SqlxBlockRepository};
pub use event::{EventRepository, SqlxEventRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use settings::{SettingsRepository, SqlxSettingsRepository};
pub use trigger::{SqlxTriggerWordRepository, TriggerWordRepository};

use std::sync::Arc;

use sqlx::SqlitePool;

/// Bundle of repositories backed by one pool.
///
/// Passed by `Arc` to the poller, session manager, and block tracker; the
/// store is the only resource shared across accounts.
#[derive(Clone)]
pub struct Store {
    pub accounts: Arc<dyn AccountRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub events: Arc<dyn EventRepository>,
    pub blocks: Arc<dyn BlockRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub triggers: Arc<dyn TriggerWordRepository>,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            accounts: Arc::new(SqlxAccountRepository::new(pool.clone())),
            sessions: Arc::new(SqlxSessionRepository::new(pool.clone())),
            events: Arc::new(SqlxEventRepository::new(pool.clone())),
            blocks: Arc::new(SqlxBlockRepository::new(pool.clone())),
            settings: Arc::new(SqlxSettingsRepository::new(pool.clone())),
            triggers: Arc::new(SqlxTriggerWordRepository::new(pool)),
        }
    }
}
