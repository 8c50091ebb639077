//! Monitoring core.
//!
//! Liveness probing, per-account connection supervision, block tracking,
//! and the polling scheduler.

pub mod blocks;
pub mod events;
pub mod poller;
pub mod prober;
pub mod state;
pub mod supervisor;

pub use blocks::BlockTracker;
pub use events::{MonitorEvent, MonitorEventBroadcaster};
pub use poller::{AccountPoller, CheckOutcome};
pub use prober::{LivenessProber, ProbeOutcome, ProbeReason};
pub use state::AccountState;
pub use supervisor::{
    ConnectionSupervisor, SupervisorConfig, SupervisorEvent, SupervisorHandle, TerminationOutcome,
};
