//! WebSocket frame codec
//!
//! Text frames carry one JSON event each: `{"event": ..., "data": {...}}`.

use crate::application::dto::{ClientEvent, ServerEvent};
use crate::shared::error::SyncError;

/// Decode a client frame. Unknown events, unknown fields and malformed
/// JSON are all protocol errors.
pub fn decode_client_event(text: &str) -> Result<ClientEvent, SyncError> {
    serde_json::from_str(text).map_err(|e| SyncError::Protocol(format!("invalid frame: {}", e)))
}

/// Encode a server event as a text frame payload.
pub fn encode_server_event(event: &ServerEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

/// Best-effort event name of a frame that failed to decode, for metrics.
pub fn frame_event_name(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|value| {
            value
                .get("event")
                .and_then(|name| name.as_str())
                .map(|name| name.chars().take(32).collect())
        })
        .unwrap_or_else(|| "malformed".into())
}
