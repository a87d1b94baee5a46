//! Message Repository Implementation
//!
//! PostgreSQL implementation of the message store with keyset pagination
//! and per-user read markers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{
    ChannelId, ConversationKey, Message, MessageDestination, MessageFilter, MessageId,
    MessageRepository, MessageScope, MessageType, NewMessage, ReadMarker, UserId,
};
use crate::shared::error::StorageError;
use crate::shared::snowflake::SnowflakeGenerator;

/// PostgreSQL message repository implementation.
pub struct PgMessageRepository {
    pool: PgPool,
    ids: Arc<SnowflakeGenerator>,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool, ids: Arc<SnowflakeGenerator>) -> Self {
        Self { pool, ids }
    }

    async fn read_markers(
        &self,
        ids: &[i64],
    ) -> Result<HashMap<i64, Vec<ReadMarker>>, StorageError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, ReadRow>(
            r#"
            SELECT message_id, user_id, read_at
            FROM message_reads
            WHERE message_id = ANY($1)
            ORDER BY read_at ASC
            "#,
        )
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        let mut markers: HashMap<i64, Vec<ReadMarker>> = HashMap::new();
        for row in rows {
            markers.entry(row.message_id).or_default().push(ReadMarker {
                user_id: UserId::new(row.user_id),
                read_at: row.read_at,
            });
        }
        Ok(markers)
    }

    async fn attach_markers(&self, rows: Vec<MessageRow>) -> Result<Vec<Message>, StorageError> {
        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let mut markers = self.read_markers(&ids).await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let read_by = markers.remove(&row.id).unwrap_or_default();
                row.into_message(read_by)
            })
            .collect())
    }
}

/// Internal row type for message queries.
/// Maps to the messages table schema defined in the migration.
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    sender_id: String,
    channel_id: Option<String>,
    recipient_id: Option<String>,
    content: String,
    message_type: String,
    reply_to: Option<i64>,
    created_at: DateTime<Utc>,
}

impl MessageRow {
    /// Rows violating the one-destination check cannot be inserted, so
    /// `None` only guards against hand-edited data.
    fn into_message(self, read_by: Vec<ReadMarker>) -> Option<Message> {
        let destination = match (self.channel_id, self.recipient_id) {
            (Some(channel), None) => MessageDestination::Channel(ChannelId::new(channel)),
            (None, Some(recipient)) => MessageDestination::Direct(UserId::new(recipient)),
            _ => {
                tracing::warn!(message_id = self.id, "Skipping message row without a single destination");
                return None;
            }
        };

        Some(Message {
            id: MessageId::new(self.id),
            sender_id: UserId::new(self.sender_id),
            destination,
            content: self.content,
            message_type: MessageType::from_db(&self.message_type),
            reply_to: self.reply_to.map(MessageId::new),
            read_by,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReadRow {
    message_id: i64,
    user_id: String,
    read_at: DateTime<Utc>,
}

const SELECT_MESSAGE: &str = r#"
    SELECT id, sender_id, channel_id, recipient_id, content,
           message_type, reply_to, created_at
    FROM messages
"#;

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn insert_message(&self, message: NewMessage) -> Result<Message, StorageError> {
        let id = self.ids.generate();
        let created_at = id.created_at();
        let conversation = match &message.destination {
            MessageDestination::Direct(recipient) => Some(
                ConversationKey::direct(&message.sender_id, recipient)
                    .as_str()
                    .to_owned(),
            ),
            MessageDestination::Channel(_) => None,
        };

        sqlx::query(
            r#"
            INSERT INTO messages (
                id, sender_id, channel_id, recipient_id, conversation_key,
                content, message_type, reply_to, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(id.as_i64())
        .bind(message.sender_id.as_str())
        .bind(message.destination.channel_id().map(|c| c.as_str()))
        .bind(message.destination.recipient_id().map(|r| r.as_str()))
        .bind(conversation)
        .bind(&message.content)
        .bind(message.message_type.as_str())
        .bind(message.reply_to.map(|r| r.as_i64()))
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Message {
            id,
            sender_id: message.sender_id,
            destination: message.destination,
            content: message.content,
            message_type: message.message_type,
            reply_to: message.reply_to,
            read_by: Vec::new(),
            created_at,
        })
    }

    /// Keyset pagination over `id`, newest first.
    async fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<Message>, StorageError> {
        let (column, key) = match &filter.scope {
            MessageScope::Channel(channel) => ("channel_id", channel.as_str().to_owned()),
            MessageScope::Conversation(a, b) => (
                "conversation_key",
                ConversationKey::direct(a, b).as_str().to_owned(),
            ),
        };

        let sql = format!(
            "{} WHERE {} = $1 AND ($2::BIGINT IS NULL OR id < $2) ORDER BY id DESC LIMIT $3",
            SELECT_MESSAGE, column
        );

        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(key)
            .bind(filter.before.map(|b| b.as_i64()))
            .bind(i64::from(filter.limit))
            .fetch_all(&self.pool)
            .await?;

        self.attach_markers(rows).await
    }

    async fn find_by_id(&self, id: MessageId) -> Result<Option<Message>, StorageError> {
        let sql = format!("{} WHERE id = $1", SELECT_MESSAGE);
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.attach_markers(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// First read wins: a repeated mark keeps the original `read_at`.
    async fn mark_read(
        &self,
        id: MessageId,
        user_id: &UserId,
        read_at: DateTime<Utc>,
    ) -> Result<Option<Message>, StorageError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO message_reads (message_id, user_id, read_at)
            SELECT id, $2, $3 FROM messages WHERE id = $1
            ON CONFLICT (message_id, user_id) DO NOTHING
            "#,
        )
        .bind(id.as_i64())
        .bind(user_id.as_str())
        .bind(read_at)
        .execute(&self.pool)
        .await?;

        tracing::trace!(
            message_id = %id,
            user_id = %user_id,
            new_marker = inserted.rows_affected() > 0,
            "Read marker stored"
        );

        self.find_by_id(id).await
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
