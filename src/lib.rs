//! Clanhall - social backend with live presence, direct messaging, clans and
//! ranked feeds
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 API Layer (Axum + WebSocket)                 │
//! │  - JSON endpoints under /api                                │
//! │  - /api/realtime live sessions                              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Visibility policy, feed ranking                          │
//! │  - Clan governance, messaging, notification fan-out         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌──────────────────────────────┐ ┌────────────────────────────┐
//! │          Data Layer          │ │     Session Registry       │
//! │  - SQLite (sqlx)             │ │  - users, sessions, rooms  │
//! │  - profile cache (moka)      │ │  - fire-and-forget fan-out │
//! └──────────────────────────────┘ └────────────────────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod realtime;
pub mod service;

use std::sync::Arc;

use realtime::SessionRegistry;
use service::{
    ClanService, FeedService, GraphService, MessagingService, NotificationService, PostService,
    SearchService, UserService,
};

/// Application state shared across all handlers
///
/// Cloned per request; everything inside is reference counted.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::AppConfig>,
    pub db: Arc<data::Database>,
    /// Display fields used to denormalise events and notifications
    pub profile_cache: Arc<data::ProfileCache>,
    /// Live sessions; torn down on shutdown
    pub registry: Arc<SessionRegistry>,

    pub users: Arc<UserService>,
    pub graph: Arc<GraphService>,
    pub posts: Arc<PostService>,
    pub feed: Arc<FeedService>,
    pub search: Arc<SearchService>,
    pub clans: Arc<ClanService>,
    pub messaging: Arc<MessagingService>,
    pub notifications: Arc<NotificationService>,
}

impl AppState {
    /// Connect to the database and wire the services together
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or migrated
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let db = Arc::new(data::Database::connect(&config.database.path).await?);
        tracing::info!(path = %config.database.path.display(), "Database connected");

        // No session survives a restart
        let stale = {
            let mut conn = db.acquire().await?;
            data::users::reset_presence(&mut conn).await?
        };
        if stale > 0 {
            tracing::info!(users = stale, "Cleared stale online presence");
        }

        let profile_cache = Arc::new(data::ProfileCache::new(
            config.cache.profile_ttl,
            config.cache.profile_max_entries,
        ));
        let registry = Arc::new(SessionRegistry::new());

        let notifications = Arc::new(NotificationService::new(
            db.clone(),
            profile_cache.clone(),
            registry.clone(),
        ));
        let users = Arc::new(UserService::new(
            db.clone(),
            profile_cache.clone(),
            registry.clone(),
        ));
        let graph = Arc::new(GraphService::new(db.clone(), notifications.clone()));
        let posts = Arc::new(PostService::new(
            db.clone(),
            profile_cache.clone(),
            notifications.clone(),
        ));
        let feed = Arc::new(FeedService::new(
            db.clone(),
            profile_cache.clone(),
            config.feed.clone(),
        ));
        let search = Arc::new(SearchService::new(db.clone(), profile_cache.clone()));
        let clans = Arc::new(ClanService::new(db.clone()));
        let messaging = Arc::new(MessagingService::new(
            db.clone(),
            profile_cache.clone(),
            registry.clone(),
            notifications.clone(),
        ));

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db,
            profile_cache,
            registry,
            users,
            graph,
            posts,
            feed,
            search,
            clans,
            messaging,
            notifications,
        })
    }
}

/// Build the Axum router with all routes.
///
/// Shared by the binary and integration tests to keep route composition
/// consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, extract::DefaultBodyLimit, middleware};
    use tower_http::{
        compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
        trace::TraceLayer,
    };

    let body_limit = state.config.server.body_limit_bytes;
    let metrics = api::metrics_router()
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api", api::api_router(state.clone()))
        .merge(metrics)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
