//! Client-side typing indicator expiry.
//!
//! The server never times typing out. Receivers hide an indicator once no
//! refresh arrived within the expiry window, or on an explicit stop.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::application::dto::ServerEvent;
use crate::domain::{ChannelId, UserId};

/// How long an indicator stays visible without a refresh
pub const TYPING_EXPIRY: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingIndicator {
    pub user_id: UserId,
    pub user_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TypingTracker {
    expiry: Duration,
    active: HashMap<(ChannelId, UserId), (Option<String>, Instant)>,
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new(TYPING_EXPIRY)
    }
}

impl TypingTracker {
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            active: HashMap::new(),
        }
    }

    pub fn apply(&mut self, event: &ServerEvent) -> bool {
        self.apply_at(event, Instant::now())
    }

    pub fn apply_at(&mut self, event: &ServerEvent, now: Instant) -> bool {
        match event {
            ServerEvent::UserTyping(typing) => {
                self.active.insert(
                    (typing.channel_id.clone(), typing.user_id.clone()),
                    (typing.user_name.clone(), now),
                );
                true
            }
            ServerEvent::UserStopTyping(typing) => self
                .active
                .remove(&(typing.channel_id.clone(), typing.user_id.clone()))
                .is_some(),
            _ => false,
        }
    }

    pub fn typing_in(&mut self, channel_id: &ChannelId) -> Vec<TypingIndicator> {
        self.typing_in_at(channel_id, Instant::now())
    }

    /// Live indicators for a channel; expired ones are dropped on the way.
    pub fn typing_in_at(&mut self, channel_id: &ChannelId, now: Instant) -> Vec<TypingIndicator> {
        let expiry = self.expiry;
        self.active
            .retain(|_, (_, seen)| now.saturating_duration_since(*seen) < expiry);

        let mut indicators: Vec<TypingIndicator> = self
            .active
            .iter()
            .filter(|((channel, _), _)| channel == channel_id)
            .map(|((_, user_id), (user_name, _))| TypingIndicator {
                user_id: user_id.clone(),
                user_name: user_name.clone(),
            })
            .collect();
        indicators.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        indicators
    }
}
