//! Search endpoint

use axum::{
    extract::{Query, State},
    response::Json,
};

use super::dto::{SearchParams, SearchResponse};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;

/// GET /api/search?query=
pub async fn search(
    State(state): State<AppState>,
    CurrentUser(session): CurrentUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let results = state.search.search(&session.user_id, &params.query).await?;
    Ok(Json(results.into()))
}
