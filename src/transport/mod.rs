//! Stream transport abstraction.
//!
//! The wire protocol to the streaming platform is treated as an opaque
//! transport behind the [`LiveTransport`] trait: it connects to a room,
//! yields typed [`LiveEvent`]s, and can fail with a distinguished "blocked"
//! error class that the monitoring layer escalates to the block tracker.

mod events;

pub use events::{EventKind, LiveEvent, UserContext};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Transport-level result type.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Error signatures that indicate a platform-imposed block even when the
/// transport did not classify the failure itself.
const BLOCK_SIGNATURES: &[&str] = &[
    "blocked",
    "captcha",
    "access denied",
    "sign server",
    "rate limit",
];

/// Transport-level errors.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The platform denied the handshake/upgrade for this client.
    /// Terminal for the current attempt; never retried in place.
    #[error("connection blocked by platform: {message}")]
    Blocked { code: Option<i64>, message: String },

    /// Ordinary connect failure (network, handshake, room not found).
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// The established connection dropped.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Malformed frame or unexpected protocol state.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The transport's own operation timed out.
    #[error("transport timeout: {0}")]
    Timeout(String),
}

impl TransportError {
    pub fn blocked(code: Option<i64>, message: impl Into<String>) -> Self {
        Self::Blocked {
            code,
            message: message.into(),
        }
    }

    /// Whether this error matches a known platform-block signature.
    ///
    /// Explicit `Blocked` errors always match; other variants match when
    /// their message carries one of the known signature fragments.
    pub fn is_block_signature(&self) -> bool {
        match self {
            Self::Blocked { .. } => true,
            Self::ConnectFailed(msg)
            | Self::ConnectionClosed(msg)
            | Self::Protocol(msg)
            | Self::Timeout(msg) => {
                let lower = msg.to_lowercase();
                BLOCK_SIGNATURES.iter().any(|sig| lower.contains(sig))
            }
        }
    }
}

/// Connection handle for an active transport stream.
#[derive(Debug, Clone)]
pub struct TransportConnection {
    /// Room identifier assigned by the platform for this broadcast.
    pub room_id: String,
    /// Whether the connection is currently established.
    pub is_connected: bool,
    /// Connection establishment time.
    pub connected_at: DateTime<Utc>,
    /// Number of reconnection attempts on this handle.
    pub reconnect_count: u32,
}

impl TransportConnection {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            is_connected: true,
            connected_at: Utc::now(),
            reconnect_count: 0,
        }
    }

    pub fn set_disconnected(&mut self) {
        self.is_connected = false;
    }

    pub fn increment_reconnect(&mut self) {
        self.reconnect_count += 1;
    }
}

/// Trait for the platform stream transport.
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Open a connection for an account handle.
    ///
    /// Fails with [`TransportError::Blocked`] when the platform denied the
    /// handshake for this client; any other error is an ordinary connect
    /// failure.
    async fn connect(&self, handle: &str) -> TransportResult<TransportConnection>;

    /// Receive the next typed event.
    /// `Ok(None)` means the stream is temporarily idle.
    async fn receive(&self, conn: &mut TransportConnection) -> TransportResult<Option<LiveEvent>>;

    /// Close the connection. Idempotent; safe to call on a closed handle.
    async fn disconnect(&self, conn: &mut TransportConnection) -> TransportResult<()>;
}
