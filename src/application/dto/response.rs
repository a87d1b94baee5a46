//! Server-to-client event contracts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    ChannelId, Message, MessageDestination, MessageId, MessageType, PresenceStatus, ReadMarker,
    UserId,
};
use crate::shared::error::FailureKind;

/// Events the server pushes to connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Fan-out of a confirmed message. Never carries a temporary id.
    NewMessage(MessageResponse),
    /// Acknowledgment to the submitting connection
    MessageSent(MessageSentPayload),
    /// Terminal rejection to the submitting connection
    MessageFailed(MessageFailedPayload),
    UserTyping(TypingEventPayload),
    UserStopTyping(TypingEventPayload),
    UserStatusChange(StatusChangePayload),
    MessageRead(ReadReceiptPayload),
}

impl ServerEvent {
    /// Event name, for logging and metrics
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerEvent::NewMessage(_) => "new_message",
            ServerEvent::MessageSent(_) => "message_sent",
            ServerEvent::MessageFailed(_) => "message_failed",
            ServerEvent::UserTyping(_) => "user_typing",
            ServerEvent::UserStopTyping(_) => "user_stop_typing",
            ServerEvent::UserStatusChange(_) => "user_status_change",
            ServerEvent::MessageRead(_) => "message_read",
        }
    }
}

/// Wire shape of a confirmed message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: MessageId,
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<UserId>,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read_by: Vec<ReadMarker>,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        let (channel_id, recipient_id) = match message.destination {
            MessageDestination::Channel(id) => (Some(id), None),
            MessageDestination::Direct(id) => (None, Some(id)),
        };

        Self {
            id: message.id,
            sender_id: message.sender_id,
            channel_id,
            recipient_id,
            content: message.content,
            message_type: message.message_type,
            reply_to: message.reply_to,
            created_at: message.created_at,
            read_by: message.read_by,
        }
    }
}

impl From<&Message> for MessageResponse {
    fn from(message: &Message) -> Self {
        Self::from(message.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSentPayload {
    /// Echoed unchanged from the submission
    pub temp_id: Option<String>,
    pub message: MessageResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFailedPayload {
    pub temp_id: Option<String>,
    pub error: FailureDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEventPayload {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub channel_id: ChannelId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangePayload {
    pub user_id: UserId,
    pub status: PresenceStatus,
}

/// Read receipt. Scoped by `channel_id` for channel messages, or by the
/// canonical `conversation_id` for direct messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceiptPayload {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub read_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// History page returned by the HTTP message endpoints
#[derive(Debug, Clone, Serialize)]
pub struct MessageListResponse {
    pub messages: Vec<MessageResponse>,
}
