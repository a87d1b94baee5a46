//! # Domain Layer
//!
//! Entities, identifier value objects and the collaborator traits of the
//! synchronization core. No dependencies on transport or storage details.
//!
//! - **entities**: Message, presence and typing state, storage/identity traits
//! - **value_objects**: UserId, ChannelId, ConnectionId, MessageId, ConversationKey

pub mod entities;
pub mod value_objects;

pub use entities::*;
pub use value_objects::*;
