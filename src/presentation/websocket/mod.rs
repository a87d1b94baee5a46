//! WebSocket Transport
//!
//! Carries the real-time sync protocol over WebSocket connections.

pub mod handler;
pub mod messages;
pub mod session;

pub use handler::ws_handler;
pub use messages::{decode_client_event, encode_server_event};
pub use session::SessionState;
