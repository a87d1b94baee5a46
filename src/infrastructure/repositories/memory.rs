//! In-memory message store.
//!
//! Mirrors the PostgreSQL store's ordering and read-marker behavior but
//! enforces no foreign keys: `reply_to` is stored as given, so callers check
//! reply targets before inserting. Used as the default backend and by the
//! test suites; `set_unavailable` simulates an outage.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::{
    Message, MessageFilter, MessageId, MessageRepository, NewMessage, ReadMarker, UserId,
};
use crate::shared::error::StorageError;
use crate::shared::snowflake::SnowflakeGenerator;

pub struct InMemoryMessageRepository {
    ids: Arc<SnowflakeGenerator>,
    messages: RwLock<BTreeMap<MessageId, Message>>,
    unavailable: AtomicBool,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::with_generator(Arc::new(SnowflakeGenerator::new(0, 0)))
    }

    pub fn with_generator(ids: Arc<SnowflakeGenerator>) -> Self {
        Self {
            ids,
            messages: RwLock::new(BTreeMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every call fail with `StorageError::Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    fn ensure_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(StorageError::Unavailable("in-memory store offline".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryMessageRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn insert_message(&self, message: NewMessage) -> Result<Message, StorageError> {
        self.ensure_available()?;

        let id = self.ids.generate();
        let stored = Message {
            id,
            sender_id: message.sender_id,
            destination: message.destination,
            content: message.content,
            message_type: message.message_type,
            reply_to: message.reply_to,
            read_by: Vec::new(),
            created_at: id.created_at(),
        };

        self.messages.write().insert(id, stored.clone());
        Ok(stored)
    }

    async fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<Message>, StorageError> {
        self.ensure_available()?;

        Ok(self
            .messages
            .read()
            .values()
            .rev()
            .filter(|message| filter.matches(message))
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, StorageError> {
        self.ensure_available()?;
        Ok(self.messages.read().get(&id).cloned())
    }

    async fn mark_read(
        &self,
        id: MessageId,
        user_id: &UserId,
        read_at: DateTime<Utc>,
    ) -> Result<Option<Message>, StorageError> {
        self.ensure_available()?;

        let mut messages = self.messages.write();
        let Some(message) = messages.get_mut(&id) else {
            return Ok(None);
        };

        if !message.is_read_by(user_id) {
            message.read_by.push(ReadMarker {
                user_id: user_id.clone(),
                read_at,
            });
        }
        Ok(Some(message.clone()))
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        self.ensure_available()
    }
}
