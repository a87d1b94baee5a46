//! Data Transfer Objects
//!
//! Typed event contracts of the real-time protocol and the HTTP history API.

pub mod request;
pub mod response;

pub use request::{
    ChannelPayload, ClientEvent, MarkReadPayload, MessageHistoryQuery, SendMessagePayload,
    SetStatusPayload, SetupSocketPayload, TypingPayload,
};
pub use response::{
    FailureDetail, MessageFailedPayload, MessageListResponse, MessageResponse,
    MessageSentPayload, ReadReceiptPayload, ServerEvent, StatusChangePayload, TypingEventPayload,
};
