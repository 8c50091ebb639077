//! Session lifecycle.

pub mod buffer;
pub mod manager;

pub use buffer::{CounterAccumulator, EventBuffer};
pub use manager::SessionManager;
