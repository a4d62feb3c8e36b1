//! Clan endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use super::dto::{Ack, ClanSettingsRequest, CreateClanRequest, RoleRequest, TargetUserRequest};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::data::{Clan, ClanInvite, EntityId};
use crate::error::AppError;
use crate::service::{ClanSettings, ClanView, JoinOutcome, JoinRequestView, parse_assignable_role};

/// POST /api/clans
pub async fn create_clan(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Json(req): Json<CreateClanRequest>,
) -> Result<(StatusCode, Json<ClanView>), AppError> {
    let clan = state
        .clans
        .create(&session.user_id, &req.name, req.is_private)
        .await?;
    Ok((StatusCode::CREATED, Json(clan)))
}

/// GET /api/clans/:name
pub async fn get_clan(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(name): Path<String>,
) -> Result<Json<ClanView>, AppError> {
    Ok(Json(state.clans.view(&session.user_id, &name).await?))
}

/// PUT /api/clans/:name/settings
pub async fn update_settings(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(name): Path<String>,
    Json(req): Json<ClanSettingsRequest>,
) -> Result<Json<Clan>, AppError> {
    let clan = state
        .clans
        .update_settings(
            &session.user_id,
            &name,
            ClanSettings {
                motto: req.motto,
                announcement: req.announcement,
                is_private: req.is_private,
            },
        )
        .await?;
    Ok(Json(clan))
}

/// POST /api/clans/:name/join
pub async fn join(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(name): Path<String>,
) -> Result<Json<JoinOutcome>, AppError> {
    Ok(Json(state.clans.join(&session.user_id, &name).await?))
}

/// POST /api/clans/leave
pub async fn leave(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let dissolved = state.clans.leave(&session.user_id).await?;
    Ok(Json(serde_json::json!({ "ok": true, "dissolved": dissolved })))
}

/// GET /api/clans/:name/requests
pub async fn join_requests(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(name): Path<String>,
) -> Result<Json<Vec<JoinRequestView>>, AppError> {
    Ok(Json(state.clans.join_requests(&session.user_id, &name).await?))
}

/// POST /api/clans/:name/requests/:id/approve
pub async fn approve_request(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path((name, request_id)): Path<(String, EntityId)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let admitted = state
        .clans
        .approve_request(&session.user_id, &name, &request_id)
        .await?;
    Ok(Json(serde_json::json!({ "ok": true, "admitted": admitted })))
}

/// POST /api/clans/:name/requests/:id/deny
pub async fn deny_request(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path((name, request_id)): Path<(String, EntityId)>,
) -> Result<Json<Ack>, AppError> {
    let changed = state
        .clans
        .deny_request(&session.user_id, &name, &request_id)
        .await?;
    Ok(Json(Ack::changed(changed)))
}

/// POST /api/clans/:name/invites
pub async fn invite(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(name): Path<String>,
    Json(req): Json<TargetUserRequest>,
) -> Result<(StatusCode, Json<ClanInvite>), AppError> {
    let invite = state
        .clans
        .invite(&session.user_id, &name, &req.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(invite)))
}

/// PUT /api/clans/:name/members/:user_id/role
pub async fn set_role(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path((name, user_id)): Path<(String, EntityId)>,
    Json(req): Json<RoleRequest>,
) -> Result<Json<Ack>, AppError> {
    let role = parse_assignable_role(req.role.trim())?;
    state
        .clans
        .set_role(&session.user_id, &name, &user_id, role)
        .await?;
    Ok(Json(Ack::ok()))
}

/// DELETE /api/clans/:name/members/:user_id
pub async fn kick(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path((name, user_id)): Path<(String, EntityId)>,
) -> Result<Json<Ack>, AppError> {
    let changed = state.clans.kick(&session.user_id, &name, &user_id).await?;
    Ok(Json(Ack::changed(changed)))
}

/// POST /api/clans/:name/transfer
pub async fn transfer(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Path(name): Path<String>,
    Json(req): Json<TargetUserRequest>,
) -> Result<Json<Ack>, AppError> {
    state
        .clans
        .transfer_leadership(&session.user_id, &name, &req.user_id)
        .await?;
    Ok(Json(Ack::ok()))
}
