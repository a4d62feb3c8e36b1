//! Profile, social graph and per-user list endpoints

use axum::{
    extract::{Path, State},
    response::Json,
};

use super::dto::{Ack, PostResponse, UpdateProfileRequest, post_responses};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::{EntityId, UserSummary};
use crate::error::AppError;
use crate::service::{FollowOutcome, InviteView, ProfileUpdate, ProfileView};

/// GET /api/users/me
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<ProfileView>, AppError> {
    let profile = state.users.profile(&session.user_id, &session.user_id).await?;
    Ok(Json(profile))
}

/// PUT /api/users/me
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileView>, AppError> {
    let profile = state
        .users
        .update_profile(
            &session.user_id,
            ProfileUpdate {
                username: req.username,
                bio: req.bio,
                avatar: req.avatar,
                is_private: req.is_private,
            },
        )
        .await?;
    Ok(Json(profile))
}

/// GET /api/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<ProfileView>, AppError> {
    Ok(Json(state.users.profile(&session.user_id, &id).await?))
}

/// GET /api/users/:id/posts
pub async fn user_posts(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<Vec<PostResponse>>, AppError> {
    let items = state.posts.by_author(&session.user_id, &id).await?;
    Ok(Json(post_responses(items)))
}

/// GET /api/users/:id/pinned
pub async fn pinned_posts(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<Vec<PostResponse>>, AppError> {
    let items = state.posts.pinned(&session.user_id, &id).await?;
    Ok(Json(post_responses(items)))
}

/// POST /api/users/:id/follow
pub async fn follow(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<FollowOutcome>, AppError> {
    Ok(Json(state.graph.follow(&session.user_id, &id).await?))
}

/// DELETE /api/users/:id/follow
pub async fn unfollow(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<Ack>, AppError> {
    let changed = state.graph.unfollow(&session.user_id, &id).await?;
    Ok(Json(Ack::changed(changed)))
}

/// POST /api/users/:id/block
pub async fn block(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<Ack>, AppError> {
    state.graph.block(&session.user_id, &id).await?;
    Ok(Json(Ack::ok()))
}

/// DELETE /api/users/:id/block
pub async fn unblock(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<Ack>, AppError> {
    let changed = state.graph.unblock(&session.user_id, &id).await?;
    Ok(Json(Ack::changed(changed)))
}

/// POST /api/users/:id/mute
pub async fn mute(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<Ack>, AppError> {
    state.graph.mute(&session.user_id, &id).await?;
    Ok(Json(Ack::ok()))
}

/// DELETE /api/users/:id/mute
pub async fn unmute(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(id): Path<EntityId>,
) -> Result<Json<Ack>, AppError> {
    let changed = state.graph.unmute(&session.user_id, &id).await?;
    Ok(Json(Ack::changed(changed)))
}

/// GET /api/users/me/follow-requests
pub async fn follow_requests(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    Ok(Json(state.graph.pending_requests(&session.user_id).await?))
}

/// POST /api/users/me/follow-requests/:id/approve
pub async fn approve_follow_request(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(requester_id): Path<EntityId>,
) -> Result<Json<Ack>, AppError> {
    state.graph.approve(&session.user_id, &requester_id).await?;
    Ok(Json(Ack::ok()))
}

/// POST /api/users/me/follow-requests/:id/deny
pub async fn deny_follow_request(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(requester_id): Path<EntityId>,
) -> Result<Json<Ack>, AppError> {
    let changed = state.graph.deny(&session.user_id, &requester_id).await?;
    Ok(Json(Ack::changed(changed)))
}

/// GET /api/users/me/clan-invites
pub async fn clan_invites(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<Vec<InviteView>>, AppError> {
    Ok(Json(state.clans.invites(&session.user_id).await?))
}

/// POST /api/users/me/clan-invites/:id/accept
pub async fn accept_clan_invite(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(invite_id): Path<EntityId>,
) -> Result<Json<serde_json::Value>, AppError> {
    let clan = state.clans.accept_invite(&session.user_id, &invite_id).await?;
    Ok(Json(serde_json::json!({ "ok": true, "clan": clan })))
}

/// POST /api/users/me/clan-invites/:id/deny
pub async fn deny_clan_invite(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(invite_id): Path<EntityId>,
) -> Result<Json<Ack>, AppError> {
    let changed = state.clans.deny_invite(&session.user_id, &invite_id).await?;
    Ok(Json(Ack::changed(changed)))
}

/// GET /api/users/me/bookmarks
pub async fn bookmarks(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<Vec<PostResponse>>, AppError> {
    Ok(Json(post_responses(state.posts.bookmarks(&session.user_id).await?)))
}

/// GET /api/users/me/hidden
pub async fn hidden(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<Vec<PostResponse>>, AppError> {
    Ok(Json(post_responses(state.posts.hidden(&session.user_id).await?)))
}
