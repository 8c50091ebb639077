pub mod alerts;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod services;
pub mod session;
pub mod transport;

pub use error::{Error, Result};
