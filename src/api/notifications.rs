//! Notification endpoints

use axum::{extract::State, response::Json};

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::realtime::NotificationView;

/// GET /api/notifications
pub async fn list(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<Vec<NotificationView>>, AppError> {
    Ok(Json(state.notifications.list(&session.user_id).await?))
}

/// POST /api/notifications/read-all
pub async fn read_all(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let updated = state.notifications.mark_all_read(&session.user_id).await?;
    Ok(Json(serde_json::json!({ "ok": true, "updated": updated })))
}

/// GET /api/notifications/unread_count
pub async fn unread_count(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = state.notifications.unread_count(&session.user_id).await?;
    Ok(Json(serde_json::json!({ "count": count })))
}
