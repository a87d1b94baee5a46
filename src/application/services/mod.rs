//! Application Services
//!
//! The synchronization core: connection bookkeeping, channel routing,
//! message ingest and ephemeral relays, composed by the [`Gateway`].

pub mod connection_registry;
pub mod ephemeral_service;
pub mod gateway;
pub mod membership_router;
pub mod message_service;

pub use connection_registry::{ConnectionHandle, ConnectionRegistry, Deregistered, EventSender};
pub use ephemeral_service::EphemeralBroadcaster;
pub use gateway::{Gateway, GatewayOptions};
pub use membership_router::MembershipRouter;
pub use message_service::MessageIngestService;
