//! Message Ingest Pipeline
//!
//! Validates, persists, acknowledges and fans out submitted messages. Every
//! submission ends in exactly one terminal event to the submitting
//! connection: `message_sent` or `message_failed`.
//!
//! Persist and fan-out for one channel or direct conversation run under the
//! same sequencing lock, so subscribers receive messages in id order.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, MutexGuard};
use validator::Validate;

use super::connection_registry::ConnectionRegistry;
use super::membership_router::MembershipRouter;
use crate::application::dto::{
    FailureDetail, MessageFailedPayload, MessageSentPayload, SendMessagePayload, ServerEvent,
};
use crate::domain::{
    ConnectionId, ConversationKey, Message, MessageDestination, MessageRepository, NewMessage,
    UserId,
};
use crate::infrastructure::metrics;
use crate::shared::error::{FailureKind, SyncError};
use crate::shared::validation;

const SEQUENCE_LOCK_STRIPES: usize = 64;

/// Fixed set of async mutexes keyed by hash. Held across the storage await,
/// so one lock per destination never has to be kept alive.
struct SequenceLocks {
    stripes: Vec<Mutex<()>>,
}

impl SequenceLocks {
    fn new(count: usize) -> Self {
        Self {
            stripes: (0..count.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe(&self, key: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.stripes.len();
        &self.stripes[index]
    }

    async fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        self.stripe(key).lock().await
    }
}

/// Sequencing key: the channel, or the canonical direct conversation.
fn sequence_key(message: &NewMessage) -> String {
    match &message.destination {
        MessageDestination::Channel(channel_id) => format!("channel:{}", channel_id),
        MessageDestination::Direct(recipient) => {
            ConversationKey::direct(&message.sender_id, recipient).to_string()
        }
    }
}

/// Ingest pipeline service
pub struct MessageIngestService {
    repository: Arc<dyn MessageRepository>,
    registry: ConnectionRegistry,
    router: MembershipRouter,
    max_content_length: usize,
    sequence_locks: SequenceLocks,
}

impl MessageIngestService {
    pub fn new(
        repository: Arc<dyn MessageRepository>,
        registry: ConnectionRegistry,
        router: MembershipRouter,
        max_content_length: usize,
    ) -> Self {
        Self {
            repository,
            registry,
            router,
            max_content_length,
            sequence_locks: SequenceLocks::new(SEQUENCE_LOCK_STRIPES),
        }
    }

    /// Run a submission through validate, persist, acknowledge, fan out.
    ///
    /// The sender receives exactly one of `message_sent` or `message_failed`.
    /// If the sender disconnected meanwhile the message still persists and
    /// the undeliverable acknowledgment is dropped.
    pub async fn submit(
        &self,
        origin: ConnectionId,
        payload: SendMessagePayload,
    ) -> Result<Message, SyncError> {
        let temp_id = payload.temp_id.clone();

        let new_message = match self.prepare(origin, payload).await {
            Ok(new_message) => new_message,
            Err(err) => {
                self.reject(origin, temp_id, &err);
                return Err(err);
            }
        };

        // Ids are assigned on insert, so holding the destination's lock until
        // fan-out completes keeps delivery order equal to id order.
        let _turn = self.sequence_locks.lock(&sequence_key(&new_message)).await;

        let message = match self.persist(origin, new_message).await {
            Ok(message) => message,
            Err(err) => {
                self.reject(origin, temp_id, &err);
                return Err(err);
            }
        };

        metrics::record_submission("accepted");
        self.acknowledge(origin, temp_id, &message);
        self.fan_out(origin, &message);

        Ok(message)
    }

    async fn prepare(
        &self,
        origin: ConnectionId,
        payload: SendMessagePayload,
    ) -> Result<NewMessage, SyncError> {
        let new_message = self.validate(origin, payload)?;
        self.check_reply_target(&new_message).await?;
        Ok(new_message)
    }

    async fn persist(
        &self,
        origin: ConnectionId,
        new_message: NewMessage,
    ) -> Result<Message, SyncError> {
        let started = Instant::now();
        let result = self.repository.insert_message(new_message).await;
        metrics::record_persist(started.elapsed().as_secs_f64());

        result.map_err(|err| {
            tracing::warn!(
                connection_id = %origin,
                error = %err,
                "Message persistence failed"
            );
            SyncError::from(err)
        })
    }

    /// A reply must point at a stored message in the same channel or
    /// direct conversation.
    async fn check_reply_target(&self, new_message: &NewMessage) -> Result<(), SyncError> {
        let Some(reply_to) = new_message.reply_to else {
            return Ok(());
        };

        let target = self.repository.find_by_id(reply_to).await.map_err(|err| {
            tracing::warn!(reply_to = %reply_to, error = %err, "Reply target lookup failed");
            SyncError::from(err)
        })?;

        match target {
            Some(target) if target.shares_thread_with(new_message) => Ok(()),
            Some(_) => Err(SyncError::Validation(format!(
                "replyTo {} belongs to a different conversation",
                reply_to
            ))),
            None => Err(SyncError::Validation(format!(
                "replyTo {} does not exist",
                reply_to
            ))),
        }
    }

    /// Check a submission against the sending connection.
    pub fn validate(
        &self,
        origin: ConnectionId,
        payload: SendMessagePayload,
    ) -> Result<NewMessage, SyncError> {
        payload.validate().map_err(validation::validation_error)?;
        validation::check_content(&payload.content, self.max_content_length)?;

        // A registered connection whose peer already hung up still submits
        // under its bound identity.
        let bound = self
            .registry
            .get(origin)
            .map(|handle| handle.user_id().clone())
            .ok_or_else(|| SyncError::Validation("connection is not bound to a user".into()))?;
        if bound != payload.sender_id {
            return Err(SyncError::Validation(
                "senderId does not match the authenticated user".into(),
            ));
        }

        let destination = match (payload.channel_id, payload.recipient_id) {
            (Some(channel), None) if !channel.as_str().trim().is_empty() => {
                MessageDestination::Channel(channel)
            }
            (None, Some(recipient)) if !recipient.as_str().trim().is_empty() => {
                MessageDestination::Direct(recipient)
            }
            (Some(_), Some(_)) => {
                return Err(SyncError::Validation(
                    "exactly one of channelId or recipientId must be set".into(),
                ))
            }
            (None, None) => {
                return Err(SyncError::Validation(
                    "a channelId or recipientId is required".into(),
                ))
            }
            _ => return Err(SyncError::Validation("destination must not be blank".into())),
        };

        Ok(NewMessage {
            sender_id: payload.sender_id,
            destination,
            content: payload.content,
            message_type: payload.message_type.unwrap_or_default(),
            reply_to: payload.reply_to,
        })
    }

    fn acknowledge(&self, origin: ConnectionId, temp_id: Option<String>, message: &Message) {
        let ack = ServerEvent::MessageSent(MessageSentPayload {
            temp_id,
            message: message.into(),
        });

        if self.registry.send_to(origin, ack).is_err() {
            tracing::debug!(
                connection_id = %origin,
                message_id = %message.id,
                "Sender gone before acknowledgment"
            );
        }
    }

    fn reject(&self, origin: ConnectionId, temp_id: Option<String>, err: &SyncError) {
        let Some(kind) = err.failure_kind() else {
            return;
        };
        metrics::record_submission(match kind {
            FailureKind::Validation => "validation",
            FailureKind::Persistence => "persistence",
        });

        tracing::debug!(
            connection_id = %origin,
            error = %err,
            "Submission rejected"
        );

        let event = ServerEvent::MessageFailed(MessageFailedPayload {
            temp_id,
            error: FailureDetail {
                kind,
                message: err.to_string(),
            },
        });
        let _ = self.registry.send_to(origin, event);
    }

    fn fan_out(&self, origin: ConnectionId, message: &Message) {
        let event = ServerEvent::NewMessage(message.into());

        match &message.destination {
            MessageDestination::Channel(channel_id) => {
                let delivered = self.router.broadcast(channel_id, &event, Some(origin));
                tracing::debug!(
                    message_id = %message.id,
                    channel_id = %channel_id,
                    delivered,
                    "Message fanned out"
                );
            }
            MessageDestination::Direct(recipient) => {
                let Some(key) = message.conversation_key() else {
                    return;
                };

                let delivered = self
                    .direct_targets(&message.sender_id, recipient, origin)
                    .into_iter()
                    .filter(|target| self.registry.send_to(*target, event.clone()).is_ok())
                    .count();

                tracing::debug!(
                    message_id = %message.id,
                    conversation = %key,
                    delivered,
                    "Direct message delivered"
                );
            }
        }
    }

    /// Every connection of both participants, minus the submitting one.
    fn direct_targets(
        &self,
        sender: &UserId,
        recipient: &UserId,
        origin: ConnectionId,
    ) -> Vec<ConnectionId> {
        let mut targets = self.registry.connections_for(recipient);
        if sender != recipient {
            targets.extend(self.registry.connections_for(sender));
        }
        targets.retain(|target| *target != origin);
        targets
    }
}
