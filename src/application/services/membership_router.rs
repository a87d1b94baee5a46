//! Channel Membership Router
//!
//! Tracks which connections subscribe to which channel and fans channel
//! events out to them.
//!
//! Each channel's subscriber set sits behind its own mutex, and a broadcast
//! holds that mutex for the whole fan-out. Two broadcasts on one channel
//! therefore reach every subscriber in the same relative order, while
//! different channels never contend.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use super::connection_registry::ConnectionRegistry;
use crate::application::dto::ServerEvent;
use crate::domain::{ChannelId, ConnectionId};
use crate::shared::error::SyncError;

type Subscribers = Arc<Mutex<HashSet<ConnectionId>>>;

struct RouterInner {
    registry: ConnectionRegistry,
    channels: DashMap<ChannelId, Subscribers>,
    /// Reverse index so a closing connection can be purged eagerly
    memberships: DashMap<ConnectionId, HashSet<ChannelId>>,
}

/// Channel subscription router. Clones share state.
#[derive(Clone)]
pub struct MembershipRouter {
    inner: Arc<RouterInner>,
}

impl MembershipRouter {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                registry,
                channels: DashMap::new(),
                memberships: DashMap::new(),
            }),
        }
    }

    /// Subscribe a connection. Idempotent: returns `false` if it was
    /// already subscribed.
    pub fn join(&self, connection_id: ConnectionId, channel_id: &ChannelId) -> Result<bool, SyncError> {
        if !self.inner.registry.is_live(connection_id) {
            return Err(SyncError::Protocol(format!(
                "connection {} is not registered",
                connection_id
            )));
        }

        // The entry guard keeps a concurrent prune from dropping the set
        // between lookup and insert.
        let inserted = self
            .inner
            .channels
            .entry(channel_id.clone())
            .or_default()
            .lock()
            .insert(connection_id);

        self.inner
            .memberships
            .entry(connection_id)
            .or_default()
            .insert(channel_id.clone());

        if inserted {
            tracing::debug!(
                connection_id = %connection_id,
                channel_id = %channel_id,
                "Joined channel"
            );
        }

        Ok(inserted)
    }

    /// Unsubscribe a connection. Leaving a channel not joined is a no-op
    /// returning `false`.
    pub fn leave(&self, connection_id: ConnectionId, channel_id: &ChannelId) -> bool {
        if let Some(mut channels) = self.inner.memberships.get_mut(&connection_id) {
            channels.remove(channel_id);
        }
        self.inner
            .memberships
            .remove_if(&connection_id, |_, channels| channels.is_empty());

        let removed = self.remove_subscriber(channel_id, connection_id);
        if removed {
            tracing::debug!(
                connection_id = %connection_id,
                channel_id = %channel_id,
                "Left channel"
            );
        }
        removed
    }

    /// Drop every subscription of a connection. Returns the channels it was
    /// subscribed to.
    pub fn purge(&self, connection_id: ConnectionId) -> Vec<ChannelId> {
        let channels: Vec<ChannelId> = self
            .inner
            .memberships
            .remove(&connection_id)
            .map(|(_, channels)| channels.into_iter().collect())
            .unwrap_or_default();

        for channel_id in &channels {
            self.remove_subscriber(channel_id, connection_id);
        }

        if !channels.is_empty() {
            tracing::debug!(
                connection_id = %connection_id,
                channels = channels.len(),
                "Purged subscriptions"
            );
        }
        channels
    }

    fn remove_subscriber(&self, channel_id: &ChannelId, connection_id: ConnectionId) -> bool {
        let removed = match self.inner.channels.get(channel_id) {
            Some(subscribers) => subscribers.lock().remove(&connection_id),
            None => false,
        };

        self.inner
            .channels
            .remove_if(channel_id, |_, subscribers| subscribers.lock().is_empty());

        removed
    }

    /// Fan-out target list for a channel
    pub fn subscribers_of(&self, channel_id: &ChannelId) -> Vec<ConnectionId> {
        self.subscriber_set(channel_id)
            .map(|subscribers| subscribers.lock().iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_subscribed(&self, connection_id: ConnectionId, channel_id: &ChannelId) -> bool {
        self.subscriber_set(channel_id)
            .map(|subscribers| subscribers.lock().contains(&connection_id))
            .unwrap_or(false)
    }

    /// Channels a connection is subscribed to
    pub fn channels_of(&self, connection_id: ConnectionId) -> Vec<ChannelId> {
        self.inner
            .memberships
            .get(&connection_id)
            .map(|channels| channels.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn channel_count(&self) -> usize {
        self.inner.channels.len()
    }

    fn subscriber_set(&self, channel_id: &ChannelId) -> Option<Subscribers> {
        self.inner
            .channels
            .get(channel_id)
            .map(|subscribers| Arc::clone(subscribers.value()))
    }

    /// Deliver `event` to every subscriber except `except`.
    ///
    /// Best-effort: connections that vanished mid-teardown are skipped and
    /// never fail the broadcast for others. Returns the number of
    /// connections the event was queued for.
    pub fn broadcast(
        &self,
        channel_id: &ChannelId,
        event: &ServerEvent,
        except: Option<ConnectionId>,
    ) -> usize {
        let Some(subscribers) = self.subscriber_set(channel_id) else {
            return 0;
        };

        let subscribers = subscribers.lock();
        let delivered = subscribers
            .iter()
            .filter(|id| Some(**id) != except)
            .filter(|id| self.inner.registry.send_to(**id, event.clone()).is_ok())
            .count();

        tracing::trace!(
            channel_id = %channel_id,
            event = event.event_name(),
            delivered,
            "Channel broadcast"
        );
        delivered
    }
}
