//! WebSocket Session State

use std::time::Instant;

use crate::domain::{ConnectionId, UserId};

/// Per-socket state kept by the transport task
#[derive(Debug)]
pub struct SessionState {
    /// Identity proven by the handshake token
    pub user_id: UserId,
    /// Set once `setup_socket` bound the socket to the gateway
    pub connection_id: Option<ConnectionId>,
    pub opened_at: Instant,
    pub events_received: u64,
    pub protocol_errors: u64,
}

impl SessionState {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            connection_id: None,
            opened_at: Instant::now(),
            events_received: 0,
            protocol_errors: 0,
        }
    }

    pub fn bind(&mut self, connection_id: ConnectionId) {
        self.connection_id = Some(connection_id);
    }

    pub fn is_bound(&self) -> bool {
        self.connection_id.is_some()
    }

    pub fn received(&mut self) {
        self.events_received += 1;
    }

    pub fn protocol_error(&mut self) {
        self.protocol_errors += 1;
    }
}
