//! Client Reconciliation Layer
//!
//! Keeps a channel's or conversation's local message sequence, merging
//! optimistic entries with server-confirmed ones.
//!
//! Outgoing messages move `sending -> {confirmed | failed}`. A failed entry
//! stays in place and can be retried with the same temporary id.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::application::dto::{
    FailureDetail, MessageResponse, ReadReceiptPayload, SendMessagePayload, ServerEvent,
};
use crate::domain::{MessageDestination, MessageId, MessageType, ReadMarker, UserId};

/// Delivery state of an optimistic entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingStatus {
    Sending,
    Failed(FailureDetail),
}

/// A locally displayed message the server has not confirmed yet
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    pub temp_id: String,
    pub payload: SendMessagePayload,
    pub status: PendingStatus,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
}

impl PendingMessage {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, PendingStatus::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEntry {
    Pending(PendingMessage),
    Confirmed(MessageResponse),
}

impl TimelineEntry {
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            TimelineEntry::Confirmed(message) => Some(message.id),
            TimelineEntry::Pending(_) => None,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            TimelineEntry::Confirmed(message) => &message.content,
            TimelineEntry::Pending(pending) => &pending.payload.content,
        }
    }
}

/// Local ordered message sequence.
///
/// Never holds two entries for the same confirmed message id.
#[derive(Debug, Clone)]
pub struct MessageTimeline {
    local_user: UserId,
    entries: Vec<TimelineEntry>,
    confirmed: HashSet<MessageId>,
}

impl MessageTimeline {
    pub fn new(local_user: UserId) -> Self {
        Self {
            local_user,
            entries: Vec::new(),
            confirmed: HashSet::new(),
        }
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending(&self, temp_id: &str) -> Option<&PendingMessage> {
        self.entries.iter().find_map(|entry| match entry {
            TimelineEntry::Pending(pending) if pending.temp_id == temp_id => Some(pending),
            _ => None,
        })
    }

    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, TimelineEntry::Pending(_)))
            .count()
    }

    pub fn confirmed(&self, id: MessageId) -> Option<&MessageResponse> {
        self.entries.iter().find_map(|entry| match entry {
            TimelineEntry::Confirmed(message) if message.id == id => Some(message),
            _ => None,
        })
    }

    /// Append an optimistic entry and return the `send_message` payload to
    /// emit for it.
    pub fn compose(
        &mut self,
        destination: MessageDestination,
        content: impl Into<String>,
        message_type: MessageType,
    ) -> SendMessagePayload {
        let (channel_id, recipient_id) = match destination {
            MessageDestination::Channel(channel) => (Some(channel), None),
            MessageDestination::Direct(recipient) => (None, Some(recipient)),
        };
        let temp_id = Uuid::new_v4().to_string();

        let payload = SendMessagePayload {
            sender_id: self.local_user.clone(),
            channel_id,
            recipient_id,
            content: content.into(),
            temp_id: Some(temp_id.clone()),
            message_type: Some(message_type),
            reply_to: None,
        };

        self.entries.push(TimelineEntry::Pending(PendingMessage {
            temp_id,
            payload: payload.clone(),
            status: PendingStatus::Sending,
            created_at: Utc::now(),
            attempts: 1,
        }));

        payload
    }

    /// Put a failed entry back into `sending`, keeping its position and
    /// temporary id. Returns the payload to emit again.
    pub fn retry(&mut self, temp_id: &str) -> Option<SendMessagePayload> {
        self.entries.iter_mut().find_map(|entry| match entry {
            TimelineEntry::Pending(pending) if pending.temp_id == temp_id && pending.is_failed() => {
                pending.status = PendingStatus::Sending;
                pending.attempts += 1;
                Some(pending.payload.clone())
            }
            _ => None,
        })
    }

    /// Drop a pending entry the user gave up on.
    pub fn discard(&mut self, temp_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| {
            !matches!(entry, TimelineEntry::Pending(pending) if pending.temp_id == temp_id)
        });
        self.entries.len() != before
    }

    /// Fold a server event into the sequence. Returns whether anything
    /// changed.
    pub fn apply(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::MessageSent(ack) => self.confirm(ack.temp_id.as_deref(), &ack.message),
            ServerEvent::MessageFailed(failed) => match failed.temp_id.as_deref() {
                Some(temp_id) => self.fail(temp_id, failed.error.clone()),
                None => false,
            },
            ServerEvent::NewMessage(message) => self.insert_confirmed(message.clone()),
            ServerEvent::MessageRead(receipt) => self.record_read(receipt),
            _ => false,
        }
    }

    fn confirm(&mut self, temp_id: Option<&str>, message: &MessageResponse) -> bool {
        let slot = temp_id.and_then(|temp_id| {
            self.entries.iter().position(|entry| {
                matches!(entry, TimelineEntry::Pending(pending) if pending.temp_id == temp_id)
            })
        });

        match slot {
            // Already present, e.g. a duplicate acknowledgment after the
            // pending entry was replaced: only the stale pending goes.
            Some(index) if self.confirmed.contains(&message.id) => {
                self.entries.remove(index);
                true
            }
            Some(index) => {
                self.entries[index] = TimelineEntry::Confirmed(message.clone());
                self.confirmed.insert(message.id);
                true
            }
            None => self.insert_confirmed(message.clone()),
        }
    }

    fn fail(&mut self, temp_id: &str, error: FailureDetail) -> bool {
        self.entries.iter_mut().any(|entry| match entry {
            TimelineEntry::Pending(pending) if pending.temp_id == temp_id => {
                pending.status = PendingStatus::Failed(error.clone());
                true
            }
            _ => false,
        })
    }

    fn insert_confirmed(&mut self, message: MessageResponse) -> bool {
        if !self.confirmed.insert(message.id) {
            return false;
        }
        self.entries.push(TimelineEntry::Confirmed(message));
        true
    }

    fn record_read(&mut self, receipt: &ReadReceiptPayload) -> bool {
        self.entries.iter_mut().any(|entry| match entry {
            TimelineEntry::Confirmed(message) if message.id == receipt.message_id => {
                if message.read_by.iter().any(|m| m.user_id == receipt.user_id) {
                    return false;
                }
                message.read_by.push(ReadMarker {
                    user_id: receipt.user_id.clone(),
                    read_at: receipt.read_at,
                });
                true
            }
            _ => false,
        })
    }

    /// Merge a history page fetched after a reconnect. Unseen messages are
    /// slotted in by id ahead of any pending entry; known ones are skipped.
    pub fn merge_history(&mut self, page: Vec<MessageResponse>) -> usize {
        let mut added = 0;
        let mut page = page;
        page.sort_by_key(|message| message.id);

        for message in page {
            if self.confirmed.contains(&message.id) {
                continue;
            }
            let index = self
                .entries
                .iter()
                .position(|entry| match entry {
                    TimelineEntry::Confirmed(existing) => existing.id > message.id,
                    TimelineEntry::Pending(_) => true,
                })
                .unwrap_or(self.entries.len());

            self.confirmed.insert(message.id);
            self.entries.insert(index, TimelineEntry::Confirmed(message));
            added += 1;
        }
        added
    }
}
