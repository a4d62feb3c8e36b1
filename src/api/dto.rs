//! Request and response bodies
//!
//! Everything on the wire is camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{EntityId, FileMeta, HashtagCount, UserSummary};
use crate::service::{FeedItem, SearchResults};

/// A post as clients render it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: EntityId,
    pub author: UserSummary,
    pub content: String,
    pub media_url: String,
    pub media_type: String,
    pub repost_of: Option<EntityId>,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub liked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl From<FeedItem> for PostResponse {
    fn from(item: FeedItem) -> Self {
        let FeedItem {
            post,
            author,
            liked,
            score,
        } = item;
        Self {
            id: post.id,
            author: (*author).clone(),
            content: post.content,
            media_url: post.media_url,
            media_type: post.media_type,
            repost_of: post.repost_of,
            views: post.views,
            likes: post.like_count,
            comments: post.comment_count,
            liked,
            score,
            created_at: post.created_at,
        }
    }
}

pub fn post_responses(items: Vec<FeedItem>) -> Vec<PostResponse> {
    items.into_iter().map(PostResponse::from).collect()
}

/// `?limit=`; anything unparsable counts as absent
#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<String>,
}

impl LimitParams {
    pub fn limit(&self) -> Option<i64> {
        self.limit.as_deref().and_then(|raw| raw.trim().parse().ok())
    }
}

/// `?query=`
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub users: Vec<UserSummary>,
    pub posts: Vec<PostResponse>,
    pub hashtags: Vec<HashtagCount>,
}

impl From<SearchResults> for SearchResponse {
    fn from(results: SearchResults) -> Self {
        Self {
            users: results.users,
            posts: post_responses(results.posts),
            hashtags: results.hashtags,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub media_url: String,
    #[serde(default)]
    pub media_type: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub username: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClanRequest {
    pub name: String,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanSettingsRequest {
    #[serde(default)]
    pub motto: String,
    #[serde(default)]
    pub announcement: String,
    pub is_private: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetUserRequest {
    pub user_id: EntityId,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub conversation_id: EntityId,
    #[serde(default)]
    pub content: String,
    pub file: Option<FileMeta>,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ReactRequest {
    pub emoji: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenRequest {
    pub conversation_id: EntityId,
    pub message_ids: Vec<EntityId>,
}

/// Generic acknowledgement
#[derive(Debug, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
    /// Whether the call changed anything
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            ok: true,
            changed: None,
        }
    }

    pub fn changed(changed: bool) -> Self {
        Self {
            ok: true,
            changed: Some(changed),
        }
    }
}
