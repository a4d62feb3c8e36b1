//! Feed endpoints
//!
//! `?limit=` is clamped, never rejected.

use axum::{
    extract::{Query, State},
    response::Json,
};

use super::dto::{LimitParams, PostResponse, post_responses};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;

/// GET /api/feed
pub async fn personal(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<PostResponse>>, AppError> {
    let items = state.feed.personal(&session.user_id, params.limit()).await?;
    Ok(Json(post_responses(items)))
}

/// GET /api/feed/following
pub async fn following(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<PostResponse>>, AppError> {
    let items = state.feed.following(&session.user_id, params.limit()).await?;
    Ok(Json(post_responses(items)))
}

/// GET /api/feed/global
pub async fn global(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Query(params): Query<LimitParams>,
) -> Result<Json<Vec<PostResponse>>, AppError> {
    let items = state.feed.global(&session.user_id, params.limit()).await?;
    Ok(Json(post_responses(items)))
}
