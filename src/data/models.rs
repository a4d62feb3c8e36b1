//! Data models
//!
//! Rust structs representing database rows and the enums stored in them.
//! All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// Users
// =============================================================================

/// Presence as persisted on the user row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: EntityId,
    pub username: String,
    /// Unique handle, compared case-insensitively
    pub user_tag: String,
    pub avatar: String,
    pub bio: String,
    pub is_private: bool,
    pub status: PresenceStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Display fields embedded in realtime events and notification payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: EntityId,
    pub username: String,
    pub user_tag: String,
    pub avatar: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            user_tag: user.user_tag.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

// =============================================================================
// Posts
// =============================================================================

/// A post row joined with its like and comment counts
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: EntityId,
    pub author_id: EntityId,
    pub content: String,
    pub media_url: String,
    /// "none", "image" or "video"
    pub media_type: String,
    /// Set when this post is a repost of another post
    pub repost_of: Option<EntityId>,
    pub views: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: EntityId,
    pub post_id: EntityId,
    pub user_id: EntityId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A hashtag and how many posts carry it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HashtagCount {
    pub tag: String,
    pub count: i64,
}

// =============================================================================
// Clans
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Clan {
    pub name: String,
    pub motto: String,
    pub announcement: String,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

/// Role of an affiliated user inside their clan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ClanRole {
    Leader,
    Officer,
    Member,
}

impl ClanRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClanRole::Leader => "leader",
            ClanRole::Officer => "officer",
            ClanRole::Member => "member",
        }
    }

    /// Leader or officer
    pub fn can_moderate(&self) -> bool {
        matches!(self, ClanRole::Leader | ClanRole::Officer)
    }
}

/// Membership row: the only place a user's clan and role are stored
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub user_id: EntityId,
    pub clan_name: String,
    pub role: ClanRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub id: EntityId,
    pub clan_name: String,
    pub user_id: EntityId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ClanInvite {
    pub id: EntityId,
    pub user_id: EntityId,
    pub clan_name: String,
    pub from_user_id: EntityId,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Notifications
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
    FollowRequest,
    FollowApproved,
    Repost,
    Message,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
            NotificationKind::Follow => "follow",
            NotificationKind::FollowRequest => "follow_request",
            NotificationKind::FollowApproved => "follow_approved",
            NotificationKind::Repost => "repost",
            NotificationKind::Message => "message",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: EntityId,
    /// Recipient
    pub user_id: EntityId,
    pub from_id: EntityId,
    pub kind: NotificationKind,
    pub post_id: Option<EntityId>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Messaging
// =============================================================================

/// Two-party conversation; `user_a < user_b` always holds
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: EntityId,
    pub user_a: EntityId,
    pub user_b: EntityId,
    pub last_message_id: Option<EntityId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &EntityId) -> bool {
        &self.user_a == user_id || &self.user_b == user_id
    }

    /// The participant that is not `user_id`
    pub fn other_participant(&self, user_id: &EntityId) -> &EntityId {
        if &self.user_a == user_id {
            &self.user_b
        } else {
            &self.user_a
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    File,
}

/// Reference to a blob held by the media store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub url: String,
    pub name: String,
    pub size: i64,
    pub mime: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: EntityId,
    pub conversation_id: EntityId,
    pub sender_id: EntityId,
    pub content: String,
    pub message_type: MessageType,
    pub file_url: String,
    pub file_name: String,
    pub file_size: i64,
    pub file_mime: String,
    pub seen: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn file_meta(&self) -> Option<FileMeta> {
        if self.file_url.is_empty() {
            return None;
        }
        Some(FileMeta {
            url: self.file_url.clone(),
            name: self.file_name.clone(),
            size: self.file_size,
            mime: self.file_mime.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub emoji: String,
    pub user_id: EntityId,
}
