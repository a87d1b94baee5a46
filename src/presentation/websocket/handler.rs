//! WebSocket Connection Handler
//!
//! Handshake flow: the upgrade request is authenticated with a bearer token
//! (header or `?token=`), then the client must bind the socket with
//! `setup_socket` before any other event is processed.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header::AUTHORIZATION, HeaderMap},
    response::Response,
};
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time::timeout;

use super::messages::{decode_client_event, encode_server_event, frame_event_name};
use super::session::SessionState;
use crate::application::dto::ClientEvent;
use crate::domain::ConnectionId;
use crate::infrastructure::metrics;
use crate::shared::error::{AppError, AuthError, SyncError};
use crate::startup::AppState;

/// Close code sent when `setup_socket` never arrives
const CLOSE_SETUP_TIMEOUT: u16 = 4008;
/// Close code sent when the gateway refuses the connection
const CLOSE_UNAVAILABLE: u16 = 4013;

#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<HandshakeQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_owned)
        .or(query.token)
        .ok_or(AuthError::MissingToken)?;

    let user_id = state.identity.authenticate(&token).await.map_err(|e| {
        tracing::debug!(error = %e, "WebSocket handshake rejected");
        AppError::from(e)
    })?;

    let settings = &state.settings.websocket;
    Ok(ws
        .max_message_size(settings.max_message_size)
        .max_frame_size(settings.max_frame_size)
        .on_upgrade(move |socket| handle_socket(socket, state, SessionState::new(user_id))))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState, mut session: SessionState) {
    tracing::debug!(user_id = %session.user_id, "New WebSocket connection");

    // Split socket for concurrent read/write
    let (mut sink, mut stream) = socket.split();

    let setup_timeout = state.settings.websocket.setup_timeout();
    match timeout(setup_timeout, await_setup(&mut stream, &mut session)).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(user_id = %session.user_id, "Connection closed before setup_socket");
            return;
        }
        Err(_) => {
            tracing::debug!(user_id = %session.user_id, "setup_socket timeout");
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_SETUP_TIMEOUT,
                    reason: "setup_socket timeout".into(),
                })))
                .await;
            return;
        }
    }

    let (connection_id, mut events) = match state.gateway.connect(session.user_id.clone()) {
        Ok(bound) => bound,
        Err(e) => {
            tracing::warn!(user_id = %session.user_id, error = %e, "Gateway refused connection");
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_UNAVAILABLE,
                    reason: "gateway unavailable".into(),
                })))
                .await;
            return;
        }
    };
    session.bind(connection_id);

    // Forward queued server events to the socket. The queue closes when the
    // registry drops this connection.
    let mut writer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match encode_server_event(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(event = event.event_name(), "Failed to serialize event: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    tracing::info!(
        user_id = %session.user_id,
        connection_id = %connection_id,
        "Socket bound"
    );

    // Main message loop
    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&state, &mut session, connection_id, text.as_str()).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        reject(&mut session, "binary", &SyncError::Protocol("binary frames are not supported".into()));
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(connection_id = %connection_id, "Connection closed");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong are answered by axum
                    }
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }
            _ = &mut writer => {
                tracing::debug!(connection_id = %connection_id, "Outbound queue closed");
                break;
            }
        }
    }

    // Cleanup
    state.gateway.disconnect(connection_id);
    writer.abort();

    tracing::info!(
        user_id = %session.user_id,
        connection_id = %connection_id,
        events = session.events_received,
        protocol_errors = session.protocol_errors,
        "User disconnected"
    );
}

/// Read frames until a `setup_socket` for the authenticated identity
/// arrives. Anything else is dropped as a protocol error.
async fn await_setup(stream: &mut SplitStream<WebSocket>, session: &mut SessionState) -> bool {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match decode_client_event(text.as_str()) {
                Ok(ClientEvent::SetupSocket(setup)) if setup.user_id == session.user_id => {
                    return true;
                }
                Ok(ClientEvent::SetupSocket(setup)) => reject(
                    session,
                    "setup_socket",
                    &SyncError::Protocol(format!(
                        "setup_socket for {} does not match the authenticated user",
                        setup.user_id
                    )),
                ),
                Ok(other) => reject(
                    session,
                    other.event_name(),
                    &SyncError::Protocol("socket is not set up yet".into()),
                ),
                Err(err) => reject(session, &frame_event_name(text.as_str()), &err),
            },
            Ok(Message::Close(_)) | Err(_) => return false,
            Ok(_) => continue,
        }
    }
    false
}

/// Decode and dispatch one text frame from a bound socket.
async fn handle_frame(
    state: &AppState,
    session: &mut SessionState,
    connection_id: ConnectionId,
    text: &str,
) {
    let event = match decode_client_event(text) {
        Ok(event) => event,
        Err(err) => {
            reject(session, &frame_event_name(text), &err);
            return;
        }
    };

    session.received();
    let name = event.event_name();

    match state.gateway.dispatch(connection_id, event).await {
        Ok(()) => {}
        Err(err @ SyncError::Protocol(_)) => reject(session, name, &err),
        // Submission rejections reach the sender as message_failed
        Err(err @ (SyncError::Validation(_) | SyncError::Persistence(_))) => {
            tracing::debug!(
                connection_id = %connection_id,
                event = name,
                error = %err,
                "Event rejected"
            );
        }
        Err(SyncError::Delivery(target)) => {
            tracing::trace!(connection_id = %connection_id, target = %target, "Delivery skipped");
        }
    }
}

/// Log and count a dropped event. The connection stays open.
fn reject(session: &mut SessionState, event: &str, err: &SyncError) {
    session.protocol_error();
    metrics::record_protocol_error(event);
    tracing::warn!(
        user_id = %session.user_id,
        connection_id = ?session.connection_id.map(|id| id.to_string()),
        event,
        error = %err,
        "Dropped client event"
    );
}
