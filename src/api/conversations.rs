//! Conversation endpoints

use axum::{
    extract::{Path, State},
    response::Json,
};

use super::dto::{Ack, TargetUserRequest};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::EntityId;
use crate::error::AppError;
use crate::realtime::MessageView;
use crate::service::ConversationView;

/// GET /api/conversations
pub async fn list(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<Vec<ConversationView>>, AppError> {
    Ok(Json(state.messaging.conversations(&session.user_id).await?))
}

/// POST /api/conversations
///
/// Returns the existing conversation for the pair if there is one.
pub async fn get_or_create(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Json(req): Json<TargetUserRequest>,
) -> Result<Json<ConversationView>, AppError> {
    let conversation = state
        .messaging
        .get_or_create(&session.user_id, &req.user_id)
        .await?;
    Ok(Json(conversation))
}

/// GET /api/conversations/:id
pub async fn get_conversation(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<ConversationView>, AppError> {
    Ok(Json(state.messaging.conversation(&session.user_id, &id).await?))
}

/// DELETE /api/conversations/:id
pub async fn delete_conversation(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<Ack>, AppError> {
    state.messaging.delete_conversation(&session.user_id, &id).await?;
    Ok(Json(Ack::ok()))
}

/// GET /api/conversations/:id/messages
pub async fn messages(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<Vec<MessageView>>, AppError> {
    Ok(Json(state.messaging.messages(&session.user_id, &id).await?))
}
