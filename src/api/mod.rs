//! API layer
//!
//! JSON endpoints under `/api`, the realtime upgrade, and Prometheus metrics.
//! Every `/api` route requires a verified session.

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::AppState;
use crate::auth::require_auth;

mod clans;
mod conversations;
pub mod dto;
mod feed;
mod messages;
pub mod metrics;
mod notifications;
mod posts;
mod search;
mod users;

pub use dto::*;
pub use metrics::metrics_router;

/// Create the `/api` router
pub fn api_router(state: AppState) -> Router<AppState> {
    Router::new()
        // Users and graph
        .route("/users/me", get(users::me).put(users::update_me))
        .route("/users/me/follow-requests", get(users::follow_requests))
        .route(
            "/users/me/follow-requests/:id/approve",
            post(users::approve_follow_request),
        )
        .route(
            "/users/me/follow-requests/:id/deny",
            post(users::deny_follow_request),
        )
        .route("/users/me/clan-invites", get(users::clan_invites))
        .route(
            "/users/me/clan-invites/:id/accept",
            post(users::accept_clan_invite),
        )
        .route(
            "/users/me/clan-invites/:id/deny",
            post(users::deny_clan_invite),
        )
        .route("/users/me/bookmarks", get(users::bookmarks))
        .route("/users/me/hidden", get(users::hidden))
        .route("/users/:id", get(users::get_user))
        .route("/users/:id/posts", get(users::user_posts))
        .route("/users/:id/pinned", get(users::pinned_posts))
        .route("/users/:id/follow", post(users::follow).delete(users::unfollow))
        .route("/users/:id/block", post(users::block).delete(users::unblock))
        .route("/users/:id/mute", post(users::mute).delete(users::unmute))
        // Posts
        .route("/posts", post(posts::create_post))
        .route("/posts/:id", get(posts::get_post).delete(posts::delete_post))
        .route("/posts/:id/like", post(posts::toggle_like))
        .route(
            "/posts/:id/comments",
            get(posts::comments).post(posts::add_comment),
        )
        .route("/posts/:id/repost", post(posts::repost))
        .route("/posts/:id/hide", post(posts::hide).delete(posts::unhide))
        .route("/posts/:id/pin", post(posts::pin).delete(posts::unpin))
        .route("/posts/:id/bookmark", post(posts::toggle_bookmark))
        // Feeds
        .route("/feed", get(feed::personal))
        .route("/feed/following", get(feed::following))
        .route("/feed/global", get(feed::global))
        .route("/search", get(search::search))
        // Clans
        .route("/clans", post(clans::create_clan))
        .route("/clans/leave", post(clans::leave))
        .route("/clans/:name", get(clans::get_clan))
        .route("/clans/:name/settings", put(clans::update_settings))
        .route("/clans/:name/join", post(clans::join))
        .route("/clans/:name/requests", get(clans::join_requests))
        .route(
            "/clans/:name/requests/:id/approve",
            post(clans::approve_request),
        )
        .route("/clans/:name/requests/:id/deny", post(clans::deny_request))
        .route("/clans/:name/invites", post(clans::invite))
        .route(
            "/clans/:name/members/:user_id",
            axum::routing::delete(clans::kick),
        )
        .route("/clans/:name/members/:user_id/role", put(clans::set_role))
        .route("/clans/:name/transfer", post(clans::transfer))
        // Messaging
        .route(
            "/conversations",
            get(conversations::list).post(conversations::get_or_create),
        )
        .route(
            "/conversations/:id",
            get(conversations::get_conversation).delete(conversations::delete_conversation),
        )
        .route("/conversations/:id/messages", get(conversations::messages))
        .route("/messages", post(messages::send))
        .route("/messages/seen", post(messages::seen))
        .route("/messages/:id", put(messages::edit).delete(messages::delete))
        .route("/messages/:id/react", post(messages::react))
        // Notifications
        .route("/notifications", get(notifications::list))
        .route("/notifications/read-all", post(notifications::read_all))
        .route("/notifications/unread_count", get(notifications::unread_count))
        // Realtime
        .route("/realtime", get(crate::realtime::realtime_handler))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}
