//! Client-to-server event contracts.
//!
//! Every frame is `{"event": "<name>", "data": {...}}`. Event names and
//! payload fields form a closed set: anything unknown fails to parse and is
//! treated as a protocol error by the transport.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::{ChannelId, MessageId, MessageType, PresenceStatus, UserId};

/// Events a client may emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case", deny_unknown_fields)]
pub enum ClientEvent {
    /// Binds the connection to its authenticated identity
    SetupSocket(SetupSocketPayload),
    JoinChannel(ChannelPayload),
    LeaveChannel(ChannelPayload),
    SendMessage(SendMessagePayload),
    Typing(TypingPayload),
    StopTyping(TypingPayload),
    MarkRead(MarkReadPayload),
    /// Explicit presence override (e.g. away)
    SetStatus(SetStatusPayload),
}

impl ClientEvent {
    /// Event name, for logging
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientEvent::SetupSocket(_) => "setup_socket",
            ClientEvent::JoinChannel(_) => "join_channel",
            ClientEvent::LeaveChannel(_) => "leave_channel",
            ClientEvent::SendMessage(_) => "send_message",
            ClientEvent::Typing(_) => "typing",
            ClientEvent::StopTyping(_) => "stop_typing",
            ClientEvent::MarkRead(_) => "mark_read",
            ClientEvent::SetStatus(_) => "set_status",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SetupSocketPayload {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChannelPayload {
    pub channel_id: ChannelId,
}

/// Message submission.
///
/// Exactly one of `channel_id` / `recipient_id` must be set; that and the
/// configurable content bound are checked by the ingest pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendMessagePayload {
    pub sender_id: UserId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<UserId>,

    #[validate(length(min = 1, message = "Message content must not be empty"))]
    pub content: String,

    /// Correlation token echoed back in `message_sent` / `message_failed`
    #[validate(length(min = 1, max = 128, message = "Invalid temporary id"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<MessageType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TypingPayload {
    pub channel_id: ChannelId,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MarkReadPayload {
    pub message_id: MessageId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SetStatusPayload {
    pub user_id: UserId,
    pub status: PresenceStatus,
}

/// History query string for the message list endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageHistoryQuery {
    pub before: Option<MessageId>,
    pub limit: Option<u32>,
}
