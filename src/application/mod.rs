//! Application Layer
//!
//! The synchronization services (registry, router, ingest, ephemeral
//! broadcaster, gateway) and the protocol event types they exchange with
//! connected clients.

pub mod dto;
pub mod services;
