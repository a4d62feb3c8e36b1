//! WebSocket transport
//!
//! The credential is verified by the [`CurrentUser`] extractor before the
//! upgrade, so a rejected client never touches the registry. After the
//! upgrade a writer task drains the session's inbox into the socket while
//! the reader loop handles client frames one at a time, in receipt order.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::events::{ClientEvent, RealtimeEvent, TypingIndicator};
use super::registry::{ConnectionId, Inbox, conversation_room};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::{EntityId, PresenceStatus, users};

/// `GET /api/realtime`
pub async fn realtime_handler(
    CurrentUser(session): CurrentUser,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state, session.user_id))
}

/// One live connection and the rooms it has joined
struct Connection {
    state: AppState,
    user_id: EntityId,
    connection_id: ConnectionId,
    rooms: HashSet<EntityId>,
}

async fn handle_connection(socket: WebSocket, state: AppState, user_id: EntityId) {
    let (outbox, inbox) = mpsc::unbounded_channel();
    let registration = state.registry.register(user_id.clone(), outbox).await;
    tracing::info!(
        user_id = %user_id,
        connection_id = registration.connection_id,
        "Realtime session connected"
    );

    if registration.came_online {
        persist_presence(&state, &user_id, PresenceStatus::Online, None).await;
    }

    let (sink, mut stream) = socket.split();
    let writer = tokio::spawn(write_events(sink, inbox, registration.connection_id));

    let mut connection = Connection {
        state: state.clone(),
        user_id: user_id.clone(),
        connection_id: registration.connection_id,
        rooms: HashSet::new(),
    };

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => connection.handle_text(&text).await,
            Ok(Message::Binary(data)) => {
                tracing::debug!(
                    connection_id = connection.connection_id,
                    bytes = data.len(),
                    "Ignoring binary frame"
                );
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(frame)) => {
                tracing::debug!(connection_id = connection.connection_id, ?frame, "Client closed");
                break;
            }
            Err(error) => {
                tracing::debug!(connection_id = connection.connection_id, %error, "Socket error");
                break;
            }
        }
    }

    writer.abort();
    if let Some(departure) = state.registry.deregister(registration.connection_id).await {
        if let Some(last_seen) = departure.went_offline_at {
            persist_presence(&state, &departure.user_id, PresenceStatus::Offline, Some(last_seen))
                .await;
        }
    }
    tracing::info!(
        user_id = %user_id,
        connection_id = registration.connection_id,
        "Realtime session disconnected"
    );
}

/// Forward queued events to the socket until either side goes away
async fn write_events(
    mut sink: futures::stream::SplitSink<WebSocket, Message>,
    inbox: Inbox,
    connection_id: ConnectionId,
) {
    let mut events = UnboundedReceiverStream::new(inbox);
    while let Some(event) = events.next().await {
        let text = match serde_json::to_string(event.as_ref()) {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(%error, event = event.name(), "Failed to encode event");
                continue;
            }
        };
        if sink.send(Message::Text(text)).await.is_err() {
            tracing::debug!(connection_id, "Writer stopped, socket closed");
            break;
        }
    }
}

/// Close every live session and record the last-seen time of everyone who
/// was online
pub async fn close_all(state: &AppState) {
    let online = state.registry.shutdown().await;
    let now = chrono::Utc::now();
    for user_id in &online {
        persist_presence(state, user_id, PresenceStatus::Offline, Some(now)).await;
    }
}

/// Presence is written after the registry lock has been released
async fn persist_presence(
    state: &AppState,
    user_id: &EntityId,
    status: PresenceStatus,
    last_seen: Option<chrono::DateTime<chrono::Utc>>,
) {
    let result = match state.db.acquire().await {
        Ok(mut conn) => users::set_presence(&mut conn, user_id, status, last_seen).await,
        Err(error) => Err(error),
    };
    if let Err(error) = result {
        tracing::warn!(%error, user_id = %user_id, "Failed to persist presence");
    }
}

impl Connection {
    async fn handle_text(&mut self, text: &str) {
        let event: ClientEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(error) => {
                tracing::debug!(
                    connection_id = self.connection_id,
                    %error,
                    "Malformed client frame"
                );
                return;
            }
        };

        match event {
            ClientEvent::JoinConversation { conversation_id } => self.join(conversation_id).await,
            ClientEvent::LeaveConversation { conversation_id } => {
                self.state
                    .registry
                    .leave_room(self.connection_id, &conversation_room(&conversation_id))
                    .await;
                self.rooms.remove(&conversation_id);
            }
            ClientEvent::Typing {
                conversation_id,
                is_typing,
            } => {
                if !self.rooms.contains(&conversation_id) {
                    return;
                }
                // A block placed after the join ends the relay
                if !self.still_allowed(&conversation_id).await {
                    return;
                }
                let room = conversation_room(&conversation_id);
                let event = RealtimeEvent::Typing(TypingIndicator {
                    conversation_id,
                    user_id: self.user_id.clone(),
                    is_typing,
                });
                self.state
                    .registry
                    .emit_to_room(&room, event, Some(self.connection_id))
                    .await;
            }
            ClientEvent::Seen {
                message_ids,
                conversation_id,
            } => {
                let result = self
                    .state
                    .messaging
                    .mark_seen(&self.user_id, &conversation_id, &message_ids)
                    .await;
                if let Err(error) = result {
                    tracing::debug!(
                        connection_id = self.connection_id,
                        conversation_id = %conversation_id,
                        %error,
                        "Seen acknowledgement rejected"
                    );
                }
            }
        }
    }

    async fn join(&mut self, conversation_id: EntityId) {
        if let Err(error) = self
            .state
            .messaging
            .authorize_room_join(&self.user_id, &conversation_id)
            .await
        {
            tracing::debug!(
                connection_id = self.connection_id,
                conversation_id = %conversation_id,
                %error,
                "Room join rejected"
            );
            return;
        }

        let room = conversation_room(&conversation_id);
        if self.state.registry.join_room(self.connection_id, &room).await {
            self.rooms.insert(conversation_id);
        }
    }

    /// Re-run the join check; on failure the session leaves the room
    async fn still_allowed(&mut self, conversation_id: &EntityId) -> bool {
        match self
            .state
            .messaging
            .authorize_room_join(&self.user_id, conversation_id)
            .await
        {
            Ok(()) => true,
            Err(error) => {
                tracing::debug!(
                    connection_id = self.connection_id,
                    conversation_id = %conversation_id,
                    %error,
                    "Dropping room membership"
                );
                self.state
                    .registry
                    .leave_room(self.connection_id, &conversation_room(conversation_id))
                    .await;
                self.rooms.remove(conversation_id);
                false
            }
        }
    }
}
