//! Sync Gateway
//!
//! Owns the registry, router, ingest pipeline and broadcaster for one
//! process and dispatches decoded client events to them. Instances are
//! independent, so tests can run several side by side.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::connection_registry::ConnectionRegistry;
use super::ephemeral_service::EphemeralBroadcaster;
use super::membership_router::MembershipRouter;
use super::message_service::MessageIngestService;
use crate::application::dto::{ClientEvent, ServerEvent};
use crate::domain::{ConnectionId, MessageRepository, UserId};
use crate::shared::error::SyncError;

/// Gateway tuning
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub max_content_length: usize,
    pub offline_grace: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            max_content_length: 4000,
            offline_grace: Duration::ZERO,
        }
    }
}

/// Real-time synchronization service object
pub struct Gateway {
    registry: ConnectionRegistry,
    router: MembershipRouter,
    ingest: MessageIngestService,
    ephemeral: Arc<EphemeralBroadcaster>,
    running: AtomicBool,
}

impl Gateway {
    /// A gateway in the stopped state. Call [`Gateway::start`] before
    /// connecting clients.
    pub fn new(repository: Arc<dyn MessageRepository>, options: GatewayOptions) -> Self {
        let registry = ConnectionRegistry::new(options.offline_grace);
        let router = MembershipRouter::new(registry.clone());
        let ingest = MessageIngestService::new(
            Arc::clone(&repository),
            registry.clone(),
            router.clone(),
            options.max_content_length,
        );
        let ephemeral = Arc::new(EphemeralBroadcaster::new(
            repository,
            registry.clone(),
            router.clone(),
        ));

        // Typing indicators outlive a reconnect inside the grace window and
        // are cleared only once offline is announced.
        let typing = Arc::downgrade(&ephemeral);
        registry.on_offline(move |user_id| {
            if let Some(ephemeral) = typing.upgrade() {
                ephemeral.clear_user(user_id);
            }
        });

        Self {
            registry,
            router,
            ingest,
            ephemeral,
            running: AtomicBool::new(false),
        }
    }

    pub fn start(&self) {
        if !self.running.swap(true, Ordering::AcqRel) {
            tracing::info!("Gateway started");
        }
    }

    /// Refuse new connections and drop every live one. Transport tasks see
    /// their outbound queue close and end on their own.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        let dropped = self.registry.clear();
        for handle in &dropped {
            self.router.purge(handle.id());
            self.ephemeral.clear_user(handle.user_id());
        }

        tracing::info!(connections = dropped.len(), "Gateway stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Register a bound connection. Returns its id and the queue of events
    /// to write to the transport.
    pub fn connect(
        &self,
        user_id: UserId,
    ) -> Result<(ConnectionId, mpsc::UnboundedReceiver<ServerEvent>), SyncError> {
        if !self.is_running() {
            return Err(SyncError::Protocol("gateway is not running".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.registry.register(user_id, tx);
        Ok((id, rx))
    }

    /// Tear down a connection: subscriptions first, so no fan-out targets
    /// it any more, then the registry entry.
    pub fn disconnect(&self, connection_id: ConnectionId) {
        self.router.purge(connection_id);
        self.registry.deregister(connection_id);
    }

    /// Route one client event from a bound connection.
    pub async fn dispatch(&self, origin: ConnectionId, event: ClientEvent) -> Result<(), SyncError> {
        let Some(bound) = self.registry.user_of(origin) else {
            return Err(SyncError::Protocol(format!(
                "connection {} is not registered",
                origin
            )));
        };

        match event {
            ClientEvent::SetupSocket(payload) => {
                if payload.user_id == bound {
                    Ok(())
                } else {
                    Err(SyncError::Protocol(format!(
                        "connection already bound to {}",
                        bound
                    )))
                }
            }
            ClientEvent::JoinChannel(payload) => {
                self.router.join(origin, &payload.channel_id)?;
                Ok(())
            }
            ClientEvent::LeaveChannel(payload) => {
                self.router.leave(origin, &payload.channel_id);
                Ok(())
            }
            ClientEvent::SendMessage(payload) => {
                self.ingest.submit(origin, payload).await?;
                Ok(())
            }
            ClientEvent::Typing(payload) => {
                self.ephemeral.start_typing(origin, payload)?;
                Ok(())
            }
            ClientEvent::StopTyping(payload) => {
                self.ephemeral.stop_typing(origin, payload)?;
                Ok(())
            }
            ClientEvent::MarkRead(payload) => {
                self.ephemeral.mark_read(origin, payload).await?;
                Ok(())
            }
            ClientEvent::SetStatus(payload) => {
                self.ephemeral.status_change(origin, payload)?;
                Ok(())
            }
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn router(&self) -> &MembershipRouter {
        &self.router
    }

    pub fn ephemeral(&self) -> &EphemeralBroadcaster {
        &self.ephemeral
    }
}
