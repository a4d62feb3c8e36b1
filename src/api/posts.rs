//! Post endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use super::dto::{Ack, CommentRequest, CreatePostRequest, PostResponse};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::EntityId;
use crate::error::AppError;
use crate::service::{CommentView, LikeOutcome, PostDraft};

/// POST /api/posts
pub async fn create_post(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Json(req): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostResponse>), AppError> {
    let item = state
        .posts
        .create(
            &session.user_id,
            PostDraft {
                content: req.content,
                media_url: req.media_url,
                media_type: req.media_type,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(item.into())))
}

/// GET /api/posts/:id
pub async fn get_post(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<PostResponse>, AppError> {
    Ok(Json(state.posts.get(&session.user_id, &id).await?.into()))
}

/// DELETE /api/posts/:id
pub async fn delete_post(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<Ack>, AppError> {
    state.posts.delete(&session.user_id, &id).await?;
    Ok(Json(Ack::ok()))
}

/// POST /api/posts/:id/like
pub async fn toggle_like(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<LikeOutcome>, AppError> {
    Ok(Json(state.posts.toggle_like(&session.user_id, &id).await?))
}

/// GET /api/posts/:id/comments
pub async fn comments(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<Vec<CommentView>>, AppError> {
    Ok(Json(state.posts.comments(&session.user_id, &id).await?))
}

/// POST /api/posts/:id/comments
pub async fn add_comment(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
    Json(req): Json<CommentRequest>,
) -> Result<(StatusCode, Json<CommentView>), AppError> {
    let comment = state.posts.comment(&session.user_id, &id, &req.text).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// POST /api/posts/:id/repost
pub async fn repost(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<(StatusCode, Json<PostResponse>), AppError> {
    let item = state.posts.repost(&session.user_id, &id).await?;
    Ok((StatusCode::CREATED, Json(item.into())))
}

/// POST /api/posts/:id/hide
pub async fn hide(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<Ack>, AppError> {
    state.posts.hide(&session.user_id, &id).await?;
    Ok(Json(Ack::ok()))
}

/// DELETE /api/posts/:id/hide
pub async fn unhide(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<Ack>, AppError> {
    state.posts.unhide(&session.user_id, &id).await?;
    Ok(Json(Ack::ok()))
}

/// POST /api/posts/:id/pin
pub async fn pin(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<Ack>, AppError> {
    let changed = state.posts.pin(&session.user_id, &id).await?;
    Ok(Json(Ack::changed(changed)))
}

/// DELETE /api/posts/:id/pin
pub async fn unpin(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<Ack>, AppError> {
    let changed = state.posts.unpin(&session.user_id, &id).await?;
    Ok(Json(Ack::changed(changed)))
}

/// POST /api/posts/:id/bookmark
pub async fn toggle_bookmark(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<serde_json::Value>, AppError> {
    let bookmarked = state.posts.toggle_bookmark(&session.user_id, &id).await?;
    Ok(Json(serde_json::json!({ "bookmarked": bookmarked })))
}
