//! # Domain Value Objects
//!
//! Immutable identifier types shared by every layer.
//!
//! - **UserId / ChannelId**: opaque string identities
//! - **ConnectionId**: per-handshake transport identifier
//! - **MessageId**: snowflake id assigned by storage
//! - **ConversationKey**: canonical direct-message conversation key

mod ids;
mod message_id;

pub use ids::*;
pub use message_id::*;
