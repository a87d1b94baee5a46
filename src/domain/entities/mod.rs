//! # Domain Entities
//!
//! - **Message**: a durable chat message addressed to a channel or a user
//! - **Presence / TypingState**: ephemeral per-user state
//!
//! The storage and identity collaborators are described by the
//! `MessageRepository` and `IdentityProvider` traits and implemented in the
//! infrastructure layer.

mod identity;
mod message;
mod presence;

pub use identity::IdentityProvider;
pub use message::{
    Message, MessageDestination, MessageFilter, MessageRepository, MessageScope, MessageType,
    NewMessage, ReadMarker,
};
pub use presence::{PresenceStatus, PresenceTransition, TypingState};

#[cfg(test)]
pub use identity::MockIdentityProvider;
#[cfg(test)]
pub use message::MockMessageRepository;
