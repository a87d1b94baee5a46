//! Presence and typing state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ChannelId, UserId};

/// Coarse connectivity status of a user.
///
/// Derived from connection occupancy (online iff at least one live
/// connection) unless a client sends an explicit override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    #[default]
    Offline,
    Away,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Away => "away",
        }
    }
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A presence change produced by connection bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceTransition {
    pub user_id: UserId,
    pub status: PresenceStatus,
}

/// Last typing activity of a user in a channel.
///
/// Never expired by the server. Receivers drop stale indicators on their own
/// after the client-side expiry window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingState {
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub user_name: Option<String>,
    pub last_activity: DateTime<Utc>,
}
