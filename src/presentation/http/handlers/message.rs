//! Message History Handlers
//!
//! Read-only history for reconnecting clients. Submissions go through the
//! WebSocket protocol only.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::application::dto::{MessageHistoryQuery, MessageListResponse, MessageResponse};
use crate::domain::{ChannelId, MessageFilter, MessageScope, UserId};
use crate::presentation::http::extractors::AuthUser;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Get a page of channel history, newest first
pub async fn list_channel_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(channel_id): Path<String>,
    Query(query): Query<MessageHistoryQuery>,
) -> Result<Json<MessageListResponse>, AppError> {
    if channel_id.trim().is_empty() {
        return Err(AppError::BadRequest("Invalid channel ID".into()));
    }

    tracing::debug!(user_id = %auth.user_id, channel_id = %channel_id, "Listing channel history");

    let filter = MessageFilter::new(MessageScope::Channel(ChannelId::new(channel_id)))
        .before(query.before)
        .limit(query.limit);

    fetch_page(&state, &filter).await
}

/// Get a page of the direct conversation between the caller and `user_id`
pub async fn list_direct_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
    Query(query): Query<MessageHistoryQuery>,
) -> Result<Json<MessageListResponse>, AppError> {
    if user_id.trim().is_empty() {
        return Err(AppError::BadRequest("Invalid user ID".into()));
    }

    let filter = MessageFilter::new(MessageScope::Conversation(auth.user_id, UserId::new(user_id)))
        .before(query.before)
        .limit(query.limit);

    fetch_page(&state, &filter).await
}

async fn fetch_page(
    state: &AppState,
    filter: &MessageFilter,
) -> Result<Json<MessageListResponse>, AppError> {
    let messages = state.messages.list_messages(filter).await?;

    Ok(Json(MessageListResponse {
        messages: messages.into_iter().map(MessageResponse::from).collect(),
    }))
}
