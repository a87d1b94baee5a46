//! Connection Registry
//!
//! Maps authenticated users to their live transport connections and derives
//! presence from connection occupancy: a user is online while at least one
//! connection is registered.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::application::dto::{ServerEvent, StatusChangePayload};
use crate::domain::{ConnectionId, PresenceStatus, PresenceTransition, UserId};
use crate::infrastructure::metrics;
use crate::shared::error::SyncError;

/// Outbound event queue of one connection
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// A registered live connection
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    user_id: UserId,
    sender: EventSender,
    live: AtomicBool,
    connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire) && !self.sender.is_closed()
    }

    /// Queue an event. Never blocks.
    pub fn send(&self, event: ServerEvent) -> Result<(), SyncError> {
        if !self.live.load(Ordering::Acquire) {
            return Err(SyncError::Delivery(self.id));
        }
        self.sender
            .send(event)
            .map_err(|_| SyncError::Delivery(self.id))
    }

    fn mark_dead(&self) {
        self.live.store(false, Ordering::Release);
    }
}

/// Called after a user's offline transition has been announced
pub type OfflineListener = Box<dyn Fn(&UserId) + Send + Sync>;

/// Result of removing a connection
#[derive(Debug)]
pub struct Deregistered {
    pub handle: Arc<ConnectionHandle>,
    /// Connections the user still holds after this removal
    pub remaining: usize,
}

#[derive(Debug, Default)]
struct UserEntry {
    connections: HashSet<ConnectionId>,
    /// Last presence announced for this user
    announced: PresenceStatus,
}

struct RegistryInner {
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    users: DashMap<UserId, UserEntry>,
    offline_grace: Duration,
    offline_listener: RwLock<Option<OfflineListener>>,
}

/// Connection registry service.
///
/// Cheap to clone; all clones share the same tables.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    /// Registry with an offline grace period. With a zero grace period the
    /// offline transition is announced as soon as the last connection goes.
    pub fn new(offline_grace: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                connections: DashMap::new(),
                users: DashMap::new(),
                offline_grace,
                offline_listener: RwLock::new(None),
            }),
        }
    }

    /// Run `listener` each time a user is announced offline, including
    /// announcements deferred by the grace period. Replaces any previous one.
    pub fn on_offline(&self, listener: impl Fn(&UserId) + Send + Sync + 'static) {
        *self.inner.offline_listener.write() = Some(Box::new(listener));
    }

    /// Register a connection for `user_id`.
    ///
    /// The user's first live connection announces `online` to every
    /// connected party.
    pub fn register(&self, user_id: UserId, sender: EventSender) -> ConnectionId {
        let id = ConnectionId::new();
        let handle = Arc::new(ConnectionHandle {
            id,
            user_id: user_id.clone(),
            sender,
            live: AtomicBool::new(true),
            connected_at: Utc::now(),
        });
        self.inner.connections.insert(id, handle);

        {
            let mut entry = self.inner.users.entry(user_id.clone()).or_default();
            entry.connections.insert(id);

            // A reconnect inside the grace window never announced offline,
            // so it must not announce online again either.
            if entry.announced != PresenceStatus::Online {
                entry.announced = PresenceStatus::Online;
                self.announce(PresenceTransition {
                    user_id: user_id.clone(),
                    status: PresenceStatus::Online,
                });
            }
        }

        metrics::set_websocket_connections(self.inner.connections.len() as i64);
        tracing::info!(
            connection_id = %id,
            user_id = %user_id,
            "Connection registered"
        );

        id
    }

    /// Remove a connection. Returns `None` if it was not registered.
    ///
    /// Removing the user's last connection announces `offline`, immediately
    /// or after the grace period if the user has not reconnected by then.
    pub fn deregister(&self, connection_id: ConnectionId) -> Option<Deregistered> {
        let (_, handle) = self.inner.connections.remove(&connection_id)?;
        handle.mark_dead();

        let user_id = handle.user_id().clone();
        let remaining = match self.inner.users.get_mut(&user_id) {
            Some(mut entry) => {
                entry.connections.remove(&connection_id);
                entry.connections.len()
            }
            None => 0,
        };

        if remaining == 0 {
            if self.inner.offline_grace.is_zero() {
                self.settle_offline(&user_id);
            } else {
                let registry = self.clone();
                let grace = self.inner.offline_grace;
                let user_id = user_id.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    registry.settle_offline(&user_id);
                });
            }
        }

        metrics::set_websocket_connections(self.inner.connections.len() as i64);
        tracing::info!(
            connection_id = %connection_id,
            user_id = %user_id,
            remaining,
            "Connection deregistered"
        );

        Some(Deregistered { handle, remaining })
    }

    /// Announce offline if the user still holds no connection.
    fn settle_offline(&self, user_id: &UserId) {
        let went_offline = {
            let Some(mut entry) = self.inner.users.get_mut(user_id) else {
                return;
            };
            if entry.connections.is_empty() && entry.announced == PresenceStatus::Online {
                entry.announced = PresenceStatus::Offline;
                self.announce(PresenceTransition {
                    user_id: user_id.clone(),
                    status: PresenceStatus::Offline,
                });
                true
            } else {
                false
            }
        };

        if went_offline {
            self.inner
                .users
                .remove_if(user_id, |_, entry| entry.connections.is_empty());

            if let Some(listener) = self.inner.offline_listener.read().as_ref() {
                listener(user_id);
            }
        }
    }

    fn announce(&self, transition: PresenceTransition) {
        tracing::debug!(
            user_id = %transition.user_id,
            status = %transition.status,
            "Presence transition"
        );
        let event = ServerEvent::UserStatusChange(StatusChangePayload {
            user_id: transition.user_id,
            status: transition.status,
        });
        self.broadcast_all(&event, None);
    }

    /// Connections currently held by `user_id`, for multi-device fan-out.
    pub fn connections_for(&self, user_id: &UserId) -> Vec<ConnectionId> {
        self.inner
            .users
            .get(user_id)
            .map(|entry| entry.connections.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.inner
            .connections
            .get(&connection_id)
            .map(|handle| Arc::clone(handle.value()))
    }

    /// Authenticated identity bound to a live connection
    pub fn user_of(&self, connection_id: ConnectionId) -> Option<UserId> {
        self.inner
            .connections
            .get(&connection_id)
            .filter(|handle| handle.is_live())
            .map(|handle| handle.user_id().clone())
    }

    pub fn is_live(&self, connection_id: ConnectionId) -> bool {
        self.inner
            .connections
            .get(&connection_id)
            .map(|handle| handle.is_live())
            .unwrap_or(false)
    }

    /// Occupancy-derived presence
    pub fn presence_of(&self, user_id: &UserId) -> PresenceStatus {
        let online = self
            .inner
            .users
            .get(user_id)
            .map(|entry| !entry.connections.is_empty())
            .unwrap_or(false);

        if online {
            PresenceStatus::Online
        } else {
            PresenceStatus::Offline
        }
    }

    /// Best-effort delivery to one connection.
    ///
    /// A vanished connection yields `SyncError::Delivery`, which callers
    /// doing fan-out ignore.
    pub fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) -> Result<(), SyncError> {
        let handle = self
            .get(connection_id)
            .ok_or(SyncError::Delivery(connection_id))?;

        handle.send(event).map_err(|err| {
            metrics::record_delivery_failure();
            tracing::trace!(connection_id = %connection_id, "Skipping vanished connection");
            err
        })
    }

    /// Deliver to every live connection except `except`.
    pub fn broadcast_all(&self, event: &ServerEvent, except: Option<ConnectionId>) -> usize {
        let targets: Vec<Arc<ConnectionHandle>> = self
            .inner
            .connections
            .iter()
            .filter(|handle| Some(handle.id()) != except)
            .map(|handle| Arc::clone(handle.value()))
            .collect();

        targets
            .into_iter()
            .filter(|handle| match handle.send(event.clone()) {
                Ok(()) => true,
                Err(_) => {
                    metrics::record_delivery_failure();
                    false
                }
            })
            .count()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    pub fn online_user_count(&self) -> usize {
        self.inner
            .users
            .iter()
            .filter(|entry| !entry.connections.is_empty())
            .count()
    }

    /// Drop every connection without presence announcements. Used on
    /// shutdown; the outbound queues close so transport tasks end.
    pub fn clear(&self) -> Vec<Arc<ConnectionHandle>> {
        let ids: Vec<ConnectionId> = self.inner.connections.iter().map(|h| h.id()).collect();
        let handles: Vec<Arc<ConnectionHandle>> = ids
            .into_iter()
            .filter_map(|id| self.inner.connections.remove(&id).map(|(_, h)| h))
            .collect();

        for handle in &handles {
            handle.mark_dead();
        }
        self.inner.users.clear();
        metrics::set_websocket_connections(0);

        handles
    }
}
