//! Message entity and storage trait.
//!
//! Maps to the `messages` and `message_reads` tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ChannelId, ConversationKey, MessageId, UserId};
use crate::shared::error::StorageError;

/// Message kinds accepted on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// A regular user message
    #[default]
    Text,
    /// Output produced by the assistant on a user's behalf
    Ai,
    /// Server-generated notice
    System,
}

impl MessageType {
    /// Convert from database string representation. Unknown values read as text.
    pub fn from_db(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "ai" => Self::Ai,
            "system" => Self::System,
            _ => Self::Text,
        }
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Ai => "ai",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a message is addressed. Exactly one of channel or direct recipient.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageDestination {
    Channel(ChannelId),
    /// Direct message to the given recipient; the sender is the other participant.
    Direct(UserId),
}

impl MessageDestination {
    pub fn channel_id(&self) -> Option<&ChannelId> {
        match self {
            Self::Channel(id) => Some(id),
            Self::Direct(_) => None,
        }
    }

    pub fn recipient_id(&self) -> Option<&UserId> {
        match self {
            Self::Channel(_) => None,
            Self::Direct(id) => Some(id),
        }
    }
}

/// A user's read marker on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadMarker {
    pub user_id: UserId,
    pub read_at: DateTime<Utc>,
}

/// A persisted message.
///
/// Immutable once stored, except for `read_by` which grows as participants
/// mark it read.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Snowflake id assigned by storage
    pub id: MessageId,

    pub sender_id: UserId,

    pub destination: MessageDestination,

    pub content: String,

    pub message_type: MessageType,

    /// Message this one replies to
    pub reply_to: Option<MessageId>,

    pub read_by: Vec<ReadMarker>,

    /// Assigned by storage on persist
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Conversation key for direct messages.
    pub fn conversation_key(&self) -> Option<ConversationKey> {
        self.destination
            .recipient_id()
            .map(|recipient| ConversationKey::direct(&self.sender_id, recipient))
    }

    /// Whether `user` may see this direct message. Channel messages are
    /// visible to any subscriber and always return true.
    pub fn is_participant(&self, user: &UserId) -> bool {
        match &self.destination {
            MessageDestination::Channel(_) => true,
            MessageDestination::Direct(recipient) => &self.sender_id == user || recipient == user,
        }
    }

    pub fn is_read_by(&self, user: &UserId) -> bool {
        self.read_by.iter().any(|marker| &marker.user_id == user)
    }

    /// Whether a reply to this message would stay in the same channel or
    /// direct conversation as `reply`.
    pub fn shares_thread_with(&self, reply: &NewMessage) -> bool {
        match (&self.destination, &reply.destination) {
            (MessageDestination::Channel(a), MessageDestination::Channel(b)) => a == b,
            (MessageDestination::Direct(_), MessageDestination::Direct(_)) => {
                self.conversation_key() == reply.conversation_key()
            }
            _ => false,
        }
    }
}

/// A validated message awaiting persistence. Storage assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender_id: UserId,
    pub destination: MessageDestination,
    pub content: String,
    pub message_type: MessageType,
    pub reply_to: Option<MessageId>,
}

impl NewMessage {
    pub fn conversation_key(&self) -> Option<ConversationKey> {
        self.destination
            .recipient_id()
            .map(|recipient| ConversationKey::direct(&self.sender_id, recipient))
    }
}

/// History scope for `list_messages`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageScope {
    Channel(ChannelId),
    /// Both directions of a direct conversation between the two users
    Conversation(UserId, UserId),
}

/// History query. Results are newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFilter {
    pub scope: MessageScope,
    /// Only messages with an id lower than this cursor
    pub before: Option<MessageId>,
    pub limit: u32,
}

impl MessageFilter {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(scope: MessageScope) -> Self {
        Self {
            scope,
            before: None,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    pub fn before(mut self, cursor: Option<MessageId>) -> Self {
        self.before = cursor;
        self
    }

    /// Clamps to `1..=MAX_LIMIT`.
    pub fn limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        self
    }

    /// Whether a message falls inside this filter's scope and cursor.
    pub fn matches(&self, message: &Message) -> bool {
        let in_scope = match (&self.scope, &message.destination) {
            (MessageScope::Channel(channel), MessageDestination::Channel(dest)) => channel == dest,
            (MessageScope::Conversation(a, b), MessageDestination::Direct(recipient)) => {
                (&message.sender_id == a && recipient == b)
                    || (&message.sender_id == b && recipient == a)
            }
            _ => false,
        };

        in_scope && self.before.map_or(true, |cursor| message.id < cursor)
    }
}

/// Storage interface consumed by the synchronization core.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Persist a message, assigning its id and creation timestamp.
    async fn insert_message(&self, message: NewMessage) -> Result<Message, StorageError>;

    /// Fetch history, newest first.
    async fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<Message>, StorageError>;

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, StorageError>;

    /// Record a read marker. Idempotent per (message, user); the first
    /// `read_at` wins. Returns `None` if the message does not exist.
    async fn mark_read(
        &self,
        id: MessageId,
        user_id: &UserId,
        read_at: DateTime<Utc>,
    ) -> Result<Option<Message>, StorageError>;

    /// Cheap liveness probe used by the readiness endpoint.
    async fn health_check(&self) -> Result<(), StorageError>;
}
