//! Ephemeral State Broadcaster
//!
//! Relays typing indicators, read receipts and explicit presence overrides.
//! Typing state is kept only for introspection: the server never expires it,
//! receivers drop stale indicators on their own.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;

use super::connection_registry::ConnectionRegistry;
use super::membership_router::MembershipRouter;
use crate::application::dto::{
    MarkReadPayload, ReadReceiptPayload, ServerEvent, SetStatusPayload, StatusChangePayload,
    TypingEventPayload, TypingPayload,
};
use crate::domain::{
    ChannelId, ConnectionId, MessageDestination, MessageRepository, TypingState, UserId,
};
use crate::shared::error::SyncError;

/// Ephemeral event service
pub struct EphemeralBroadcaster {
    repository: Arc<dyn MessageRepository>,
    registry: ConnectionRegistry,
    router: MembershipRouter,
    typing: DashMap<(ChannelId, UserId), TypingState>,
}

impl EphemeralBroadcaster {
    pub fn new(
        repository: Arc<dyn MessageRepository>,
        registry: ConnectionRegistry,
        router: MembershipRouter,
    ) -> Self {
        Self {
            repository,
            registry,
            router,
            typing: DashMap::new(),
        }
    }

    /// The payload's user must be the identity bound to the connection.
    fn authorize(&self, origin: ConnectionId, claimed: &UserId) -> Result<(), SyncError> {
        match self.registry.user_of(origin) {
            Some(bound) if &bound == claimed => Ok(()),
            Some(_) => Err(SyncError::Protocol(format!(
                "userId {} does not match the connection identity",
                claimed
            ))),
            None => Err(SyncError::Protocol("connection is not bound".into())),
        }
    }

    /// Refresh the typing state and tell the channel's other subscribers.
    pub fn start_typing(&self, origin: ConnectionId, payload: TypingPayload) -> Result<usize, SyncError> {
        self.authorize(origin, &payload.user_id)?;

        self.typing.insert(
            (payload.channel_id.clone(), payload.user_id.clone()),
            TypingState {
                channel_id: payload.channel_id.clone(),
                user_id: payload.user_id.clone(),
                user_name: payload.user_name.clone(),
                last_activity: Utc::now(),
            },
        );

        let channel_id = payload.channel_id.clone();
        let event = ServerEvent::UserTyping(typing_event(payload));
        Ok(self.router.broadcast(&channel_id, &event, Some(origin)))
    }

    /// Clear the typing state and tell the channel's other subscribers.
    pub fn stop_typing(&self, origin: ConnectionId, payload: TypingPayload) -> Result<usize, SyncError> {
        self.authorize(origin, &payload.user_id)?;

        self.typing
            .remove(&(payload.channel_id.clone(), payload.user_id.clone()));

        let channel_id = payload.channel_id.clone();
        let event = ServerEvent::UserStopTyping(typing_event(payload));
        Ok(self.router.broadcast(&channel_id, &event, Some(origin)))
    }

    /// Users with a typing indicator in `channel_id`, most recent first
    pub fn typing_in(&self, channel_id: &ChannelId) -> Vec<TypingState> {
        let mut states: Vec<TypingState> = self
            .typing
            .iter()
            .filter(|entry| &entry.key().0 == channel_id)
            .map(|entry| entry.value().clone())
            .collect();
        states.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        states
    }

    /// Drop every typing indicator of a user who went offline, announcing a
    /// stop in each affected channel. Returns the affected channels.
    pub fn clear_user(&self, user_id: &UserId) -> Vec<ChannelId> {
        let keys: Vec<(ChannelId, UserId)> = self
            .typing
            .iter()
            .filter(|entry| &entry.key().1 == user_id)
            .map(|entry| entry.key().clone())
            .collect();

        let mut channels = Vec::with_capacity(keys.len());
        for key in keys {
            let Some((_, state)) = self.typing.remove(&key) else {
                continue;
            };
            let event = ServerEvent::UserStopTyping(TypingEventPayload {
                user_id: state.user_id,
                user_name: state.user_name,
                channel_id: state.channel_id.clone(),
            });
            self.router.broadcast(&state.channel_id, &event, None);
            channels.push(state.channel_id);
        }

        if !channels.is_empty() {
            tracing::debug!(
                user_id = %user_id,
                channels = channels.len(),
                "Cleared typing indicators"
            );
        }
        channels
    }

    /// Record a read marker and relay the receipt.
    ///
    /// Channel receipts go to the channel's subscribers; direct-message
    /// receipts go to both participants' connections. The origin is excluded
    /// either way. Unknown messages yield a protocol error and storage
    /// failures a persistence error, neither of which broadcasts.
    pub async fn mark_read(
        &self,
        origin: ConnectionId,
        payload: MarkReadPayload,
    ) -> Result<ReadReceiptPayload, SyncError> {
        self.authorize(origin, &payload.user_id)?;

        let message = self
            .repository
            .find_by_id(payload.message_id)
            .await?
            .ok_or_else(|| SyncError::Protocol(format!("unknown message {}", payload.message_id)))?;

        if matches!(message.destination, MessageDestination::Direct(_))
            && !message.is_participant(&payload.user_id)
        {
            return Err(SyncError::Protocol(format!(
                "{} is not a participant of message {}",
                payload.user_id, payload.message_id
            )));
        }

        let updated = self
            .repository
            .mark_read(payload.message_id, &payload.user_id, Utc::now())
            .await?
            .ok_or_else(|| SyncError::Protocol(format!("unknown message {}", payload.message_id)))?;

        // The stored marker wins over our clock when the read was recorded earlier.
        let read_at = updated
            .read_by
            .iter()
            .find(|marker| marker.user_id == payload.user_id)
            .map(|marker| marker.read_at)
            .unwrap_or_else(Utc::now);

        let receipt = ReadReceiptPayload {
            message_id: updated.id,
            user_id: payload.user_id.clone(),
            read_at,
            channel_id: updated.destination.channel_id().cloned(),
            conversation_id: updated.conversation_key().map(|key| key.as_str().to_owned()),
        };
        let event = ServerEvent::MessageRead(receipt.clone());

        let delivered = match &updated.destination {
            MessageDestination::Channel(channel_id) => {
                self.router.broadcast(channel_id, &event, Some(origin))
            }
            MessageDestination::Direct(recipient) => {
                let mut targets = self.registry.connections_for(recipient);
                if &updated.sender_id != recipient {
                    targets.extend(self.registry.connections_for(&updated.sender_id));
                }
                targets
                    .into_iter()
                    .filter(|target| *target != origin)
                    .filter(|target| self.registry.send_to(*target, event.clone()).is_ok())
                    .count()
            }
        };

        tracing::debug!(
            message_id = %updated.id,
            user_id = %payload.user_id,
            delivered,
            "Read receipt relayed"
        );

        Ok(receipt)
    }

    /// Relay an explicit presence override to every other connection.
    /// Registry occupancy is left untouched.
    pub fn status_change(&self, origin: ConnectionId, payload: SetStatusPayload) -> Result<usize, SyncError> {
        self.authorize(origin, &payload.user_id)?;

        tracing::debug!(
            user_id = %payload.user_id,
            status = %payload.status,
            "Presence override"
        );

        let event = ServerEvent::UserStatusChange(StatusChangePayload {
            user_id: payload.user_id,
            status: payload.status,
        });
        Ok(self.registry.broadcast_all(&event, Some(origin)))
    }
}

fn typing_event(payload: TypingPayload) -> TypingEventPayload {
    TypingEventPayload {
        user_id: payload.user_id,
        user_name: payload.user_name,
        channel_id: payload.channel_id,
    }
}
