//! Consuming side of the sync protocol: optimistic timeline reconciliation
//! and typing indicator expiry.

pub mod timeline;
pub mod typing;

pub use timeline::{MessageTimeline, PendingMessage, PendingStatus, TimelineEntry};
pub use typing::{TypingIndicator, TypingTracker, TYPING_EXPIRY};
