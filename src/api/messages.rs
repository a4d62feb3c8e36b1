//! Message endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use super::dto::{Ack, EditMessageRequest, ReactRequest, SeenRequest, SendMessageRequest};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::{EntityId, Reaction};
use crate::error::AppError;
use crate::realtime::MessageView;
use crate::service::MessageDraft;

/// POST /api/messages
pub async fn send(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageView>), AppError> {
    let message = state
        .messaging
        .send(
            &session.user_id,
            &req.conversation_id,
            MessageDraft {
                content: req.content,
                file: req.file,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// PUT /api/messages/:id
pub async fn edit(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
    Json(req): Json<EditMessageRequest>,
) -> Result<Json<MessageView>, AppError> {
    Ok(Json(
        state.messaging.edit(&session.user_id, &id, &req.content).await?,
    ))
}

/// DELETE /api/messages/:id
pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<Ack>, AppError> {
    state.messaging.delete(&session.user_id, &id).await?;
    Ok(Json(Ack::ok()))
}

/// POST /api/messages/:id/react
pub async fn react(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
    Json(req): Json<ReactRequest>,
) -> Result<Json<Vec<Reaction>>, AppError> {
    let changed = state.messaging.react(&session.user_id, &id, &req.emoji).await?;
    Ok(Json(changed.reactions))
}

/// POST /api/messages/seen
pub async fn seen(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Json(req): Json<SeenRequest>,
) -> Result<Json<Vec<EntityId>>, AppError> {
    let seen = state
        .messaging
        .mark_seen(&session.user_id, &req.conversation_id, &req.message_ids)
        .await?;
    Ok(Json(seen))
}
