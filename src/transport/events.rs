//! Typed live-stream events.
//!
//! Events arrive from the transport as a tagged union. The monitoring layer
//! cares about the distinction between *strong* live signals (interaction
//! events that only an active broadcast produces) and *weak* signals
//! (viewer-count updates, which ghost rooms also emit).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Type of live event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Chat message.
    Chat,
    /// Gift/donation.
    Gift,
    /// Like tap.
    Like,
    /// Viewer joined the room.
    Member,
    /// Generic social notification (platform-specific).
    Social,
    /// Viewer followed the account.
    Follow,
    /// Stream shared.
    Share,
    /// Stream reposted.
    Repost,
    /// Viewer left the room.
    Leave,
    /// Paid subscription.
    Subscribe,
    /// Animated emote.
    Emote,
    /// Room viewer-count update.
    RoomUser,
    /// Intro frame sent at the start of a broadcast.
    LiveIntro,
    /// The broadcast ended.
    StreamEnd,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Gift => "gift",
            Self::Like => "like",
            Self::Member => "member",
            Self::Social => "social",
            Self::Follow => "follow",
            Self::Share => "share",
            Self::Repost => "repost",
            Self::Leave => "leave",
            Self::Subscribe => "subscribe",
            Self::Emote => "emote",
            Self::RoomUser => "room_user",
            Self::LiveIntro => "live_intro",
            Self::StreamEnd => "stream_end",
        }
    }

    /// Strong signals reliably indicate an active broadcast.
    pub fn is_strong_signal(&self) -> bool {
        matches!(
            self,
            Self::Chat
                | Self::Gift
                | Self::Like
                | Self::Member
                | Self::Social
                | Self::Follow
                | Self::Share
                | Self::Repost
                | Self::Subscribe
                | Self::Emote
                | Self::LiveIntro
        )
    }

    /// Weak signals also appear on dormant/ghost rooms.
    pub fn is_weak_signal(&self) -> bool {
        matches!(self, Self::RoomUser)
    }
}

/// User context attached to an event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            nickname: None,
        }
    }
}

/// A single typed event from the stream transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveEvent {
    /// Unique event id (platform-specific); inserts are idempotent by it.
    pub id: String,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserContext>,
    /// Type-specific payload.
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl LiveEvent {
    /// Create a bare event of a kind with an empty payload.
    pub fn of_kind(id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            id: id.into(),
            kind,
            timestamp: Utc::now(),
            user: None,
            payload: serde_json::Value::Null,
            location: None,
        }
    }

    /// Create a chat event.
    pub fn chat(id: impl Into<String>, user: UserContext, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: EventKind::Chat,
            timestamp: Utc::now(),
            user: Some(user),
            payload: serde_json::json!({ "text": text.into() }),
            location: None,
        }
    }

    /// Create a gift event.
    pub fn gift(
        id: impl Into<String>,
        user: UserContext,
        gift_name: impl Into<String>,
        count: u32,
    ) -> Self {
        Self {
            id: id.into(),
            kind: EventKind::Gift,
            timestamp: Utc::now(),
            user: Some(user),
            payload: serde_json::json!({ "gift_name": gift_name.into(), "count": count }),
            location: None,
        }
    }

    /// Create a room viewer-count update.
    pub fn room_user(id: impl Into<String>, viewer_count: i64) -> Self {
        Self {
            id: id.into(),
            kind: EventKind::RoomUser,
            timestamp: Utc::now(),
            user: None,
            payload: serde_json::json!({ "viewer_count": viewer_count }),
            location: None,
        }
    }

    /// Chat text, when this is a chat event.
    pub fn chat_text(&self) -> Option<&str> {
        if self.kind != EventKind::Chat {
            return None;
        }
        self.payload.get("text").and_then(|v| v.as_str())
    }

    /// Viewer count, when this is a room-user update.
    pub fn viewer_count(&self) -> Option<i64> {
        if self.kind != EventKind::RoomUser {
            return None;
        }
        self.payload.get("viewer_count").and_then(|v| v.as_i64())
    }
}
