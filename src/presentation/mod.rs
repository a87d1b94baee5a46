//! Presentation Layer
//!
//! History and health endpoints over HTTP, and the WebSocket transport
//! that carries the sync protocol.

pub mod http;
pub mod middleware;
pub mod websocket;
