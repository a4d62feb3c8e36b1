//! Profiles

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::data::{
    ClanRole, Database, EntityId, PresenceStatus, ProfileCache, clans, graph, posts, users,
};
use crate::error::AppError;
use crate::realtime::SessionRegistry;

const MAX_USERNAME_CHARS: usize = 50;
const MAX_BIO_CHARS: usize = 300;

/// A profile as seen by one viewer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub id: EntityId,
    pub username: String,
    pub user_tag: String,
    pub avatar: String,
    pub bio: String,
    pub is_private: bool,
    pub status: PresenceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    pub followers: i64,
    pub following: i64,
    pub clan: Option<String>,
    pub clan_role: Option<ClanRole>,
    /// Most recently pinned first
    pub pinned_posts: Vec<EntityId>,
    pub is_following: bool,
    /// The viewer has a pending follow request to this user
    pub requested: bool,
    pub created_at: DateTime<Utc>,
}

/// Editable profile fields; every field is overwritten
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub username: String,
    pub bio: String,
    pub avatar: String,
    pub is_private: bool,
}

pub struct UserService {
    db: Arc<Database>,
    profile_cache: Arc<ProfileCache>,
    registry: Arc<SessionRegistry>,
}

impl UserService {
    pub fn new(
        db: Arc<Database>,
        profile_cache: Arc<ProfileCache>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            db,
            profile_cache,
            registry,
        }
    }

    /// `status` comes from the live registry; the user row only keeps
    /// `last_seen`.
    ///
    /// # Errors
    /// `NotFound` for an unknown user, `Forbidden` across a block.
    pub async fn profile(
        &self,
        viewer_id: &EntityId,
        user_id: &EntityId,
    ) -> Result<ProfileView, AppError> {
        let mut conn = self.db.acquire().await?;
        let user = users::require(&mut conn, user_id).await?;
        if viewer_id != user_id && graph::is_blocked_either(&mut conn, viewer_id, user_id).await? {
            return Err(AppError::forbidden("blocked"));
        }

        let followers = graph::count_incoming(&mut conn, graph::Edge::Follow, user_id).await?;
        let following = graph::count_outgoing(&mut conn, graph::Edge::Follow, user_id).await?;
        let membership = clans::membership_of(&mut conn, user_id).await?;
        let is_following =
            graph::has_edge(&mut conn, graph::Edge::Follow, viewer_id, user_id).await?;
        let requested =
            graph::has_edge(&mut conn, graph::Edge::FollowRequest, viewer_id, user_id).await?;
        let pinned_posts = posts::list_ids(&mut conn, posts::PostList::Pinned, user_id).await?;
        drop(conn);

        let status = if self.registry.is_online(user_id).await {
            PresenceStatus::Online
        } else {
            PresenceStatus::Offline
        };

        Ok(ProfileView {
            id: user.id,
            username: user.username,
            user_tag: user.user_tag,
            avatar: user.avatar,
            bio: user.bio,
            is_private: user.is_private,
            status,
            last_seen: user.last_seen,
            followers,
            following,
            clan: membership.as_ref().map(|m| m.clan_name.clone()),
            clan_role: membership.map(|m| m.role),
            pinned_posts,
            is_following,
            requested,
            created_at: user.created_at,
        })
    }

    pub async fn update_profile(
        &self,
        user_id: &EntityId,
        update: ProfileUpdate,
    ) -> Result<ProfileView, AppError> {
        let username = update.username.trim();
        if username.is_empty() {
            return Err(AppError::validation("username required"));
        }
        if username.chars().count() > MAX_USERNAME_CHARS {
            return Err(AppError::validation("username too long"));
        }
        let bio: String = update.bio.trim().chars().take(MAX_BIO_CHARS).collect();

        {
            let mut conn = self.db.acquire().await?;
            let updated = users::update_profile(
                &mut conn,
                user_id,
                username,
                &bio,
                update.avatar.trim(),
                update.is_private,
            )
            .await?;
            if !updated {
                return Err(AppError::NotFound);
            }
        }

        self.profile_cache.invalidate(user_id).await;
        tracing::info!(user_id = %user_id, "Profile updated");
        self.profile(user_id, user_id).await
    }
}
