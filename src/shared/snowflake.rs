//! Snowflake ID Generator
//!
//! Time-ordered unique message id generation used by the message stores.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::domain::{MessageId, MESSAGE_EPOCH};

const SEQUENCE_MASK: u64 = 0xFFF;

/// Snowflake ID generator
pub struct SnowflakeGenerator {
    machine_id: u64,
    node_id: u64,
    /// (last timestamp, sequence within that millisecond)
    state: Mutex<(u64, u64)>,
}

impl SnowflakeGenerator {
    /// Create a new snowflake generator
    pub fn new(machine_id: u64, node_id: u64) -> Self {
        Self {
            machine_id: machine_id & 0x1F, // 5 bits
            node_id: node_id & 0x1F,       // 5 bits
            state: Mutex::new((0, 0)),
        }
    }

    /// Generate a new message id.
    ///
    /// Ids from one generator are strictly increasing. When the sequence for
    /// the current millisecond is exhausted, or the clock steps backwards, the
    /// generator borrows from the next millisecond instead of repeating.
    pub fn generate(&self) -> MessageId {
        let mut state = self.state.lock();
        let (last, sequence) = *state;
        let now = current_timestamp().max(MESSAGE_EPOCH);

        let (timestamp, sequence) = if now > last {
            (now, 0)
        } else if sequence < SEQUENCE_MASK {
            (last, sequence + 1)
        } else {
            (last + 1, 0)
        };
        *state = (timestamp, sequence);

        let id = ((timestamp - MESSAGE_EPOCH) << 22)
            | (self.machine_id << 17)
            | (self.node_id << 12)
            | sequence;

        MessageId::new(id as i64)
    }
}

/// Get current timestamp in milliseconds
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(MESSAGE_EPOCH)
}
