//! Authentication middleware
//!
//! Protects routes that require a verified identity.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Query, State},
    http::{HeaderMap, Request, Uri, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use super::session::{Session, verify_session_token};
use crate::AppState;
use crate::data::users;
use crate::error::AppError;

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Bearer header first, then the `session` cookie, then `?token=` (used by
/// WebSocket clients that cannot set headers)
fn extract_token(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(ToOwned::to_owned)
        .or_else(|| {
            let jar = CookieJar::from_headers(headers);
            jar.get("session").map(|cookie| cookie.value().to_owned())
        })
        .or_else(|| {
            Query::<TokenQuery>::try_from_uri(uri)
                .ok()
                .and_then(|Query(query)| query.token)
                .filter(|token| !token.is_empty())
        })
}

/// Verify the token and check that its user still exists
async fn authenticate(
    headers: &HeaderMap,
    uri: &Uri,
    state: &AppState,
) -> Result<Session, AppError> {
    let token = extract_token(headers, uri).ok_or(AppError::Unauthorized)?;
    let session = verify_session_token(&token, &state.config.auth.session_secret)?;

    let mut conn = state.db.acquire().await?;
    if !users::exists(&mut conn, &session.user_id).await? {
        tracing::debug!(user_id = %session.user_id, "Token for unknown user");
        return Err(AppError::Unauthorized);
    }
    Ok(session)
}

/// Middleware to require authentication
///
/// Adds the verified [`Session`] to the request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let session = authenticate(request.headers(), request.uri(), &state).await?;
    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

/// Extractor for the current authenticated user
///
/// # Usage
/// ```ignore
/// async fn handler(CurrentUser(session): CurrentUser) -> impl IntoResponse {
///     format!("Hello, {}", session.user_id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Session);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<Session>().cloned() {
            return Ok(CurrentUser(session));
        }

        let state = AppState::from_ref(state);
        let session = authenticate(&parts.headers, &parts.uri, &state).await?;
        parts.extensions.insert(session.clone());
        Ok(CurrentUser(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer abc"));
        headers.insert("Cookie", HeaderValue::from_static("session=def"));
        let uri: Uri = "/api/realtime?token=ghi".parse().unwrap();

        assert_eq!(extract_token(&headers, &uri).as_deref(), Some("abc"));
    }

    #[test]
    fn cookie_then_query() {
        let mut headers = HeaderMap::new();
        headers.insert("Cookie", HeaderValue::from_static("session=def"));
        let uri: Uri = "/api/realtime?token=ghi".parse().unwrap();
        assert_eq!(extract_token(&headers, &uri).as_deref(), Some("def"));

        let uri: Uri = "/api/realtime?token=ghi".parse().unwrap();
        assert_eq!(extract_token(&HeaderMap::new(), &uri).as_deref(), Some("ghi"));
    }

    #[test]
    fn missing_token() {
        let uri: Uri = "/api/realtime?token=".parse().unwrap();
        assert!(extract_token(&HeaderMap::new(), &uri).is_none());
    }
}
