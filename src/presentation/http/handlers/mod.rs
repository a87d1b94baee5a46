//! HTTP Handlers
//!
//! Health probes and message history.

pub mod health;
pub mod message;
