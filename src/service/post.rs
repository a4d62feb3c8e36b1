//! Post service
//!
//! Creating, reading and interacting with posts. Interactions across a
//! block, or with a private author the actor does not follow, are
//! forbidden.

use chrono::Utc;
use serde::Serialize;
use sqlx::SqliteConnection;
use std::sync::Arc;

use super::feed::FeedItem;
use super::notification::{self, NotificationService};
use super::visibility::ensure_visible;
use crate::data::{
    Comment, Database, EntityId, Notification, NotificationKind, Post, ProfileCache, UserSummary,
    posts,
};
use crate::error::AppError;

const MEDIA_TYPES: [&str; 4] = ["none", "image", "video", "file"];
const MAX_USER_POSTS: usize = 50;

/// Lowercased `#tag` words in order of first appearance
///
/// A tag is `#` followed by one or more ASCII letters, digits or underscores.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c != '#' {
            continue;
        }
        let mut end = start + 1;
        while let Some(&(i, next)) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                end = i + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        if end > start + 1 {
            let tag = text[start..end].to_ascii_lowercase();
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }
    tags
}

/// Content of a new post
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub content: String,
    /// URL returned by the media store, empty for none
    pub media_url: String,
    pub media_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeOutcome {
    pub liked: bool,
    pub likes: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: EntityId,
    pub post_id: EntityId,
    pub user: UserSummary,
    pub text: String,
    pub created_at: chrono::DateTime<Utc>,
}

/// Post service
pub struct PostService {
    db: Arc<Database>,
    profile_cache: Arc<ProfileCache>,
    notifications: Arc<NotificationService>,
}

impl PostService {
    pub fn new(
        db: Arc<Database>,
        profile_cache: Arc<ProfileCache>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            db,
            profile_cache,
            notifications,
        }
    }

    pub async fn create(
        &self,
        author_id: &EntityId,
        draft: PostDraft,
    ) -> Result<FeedItem, AppError> {
        let content = draft.content.trim();
        let media_url = draft.media_url.trim();
        if content.is_empty() && media_url.is_empty() {
            return Err(AppError::validation("post needs content or media"));
        }

        let media_type = if media_url.is_empty() {
            "none"
        } else if draft.media_type.is_empty() {
            "image"
        } else {
            draft.media_type.as_str()
        };
        if !MEDIA_TYPES.contains(&media_type) {
            return Err(AppError::validation(format!("unknown media type: {}", media_type)));
        }

        let id = EntityId::new();
        let hashtags = extract_hashtags(content);
        let mut conn = self.db.acquire().await?;
        posts::insert(
            &mut conn,
            &posts::NewPost {
                id: &id,
                author_id,
                content,
                media_url,
                media_type,
                repost_of: None,
                created_at: Utc::now(),
            },
            &hashtags,
        )
        .await?;

        tracing::info!(post_id = %id, author_id = %author_id, "Post created");
        let post = posts::require(&mut conn, &id).await?;
        self.item(&mut conn, author_id, post).await
    }

    pub async fn get(
        &self,
        viewer_id: &EntityId,
        post_id: &EntityId,
    ) -> Result<FeedItem, AppError> {
        let mut conn = self.db.acquire().await?;
        let post = posts::require(&mut conn, post_id).await?;
        ensure_visible(&mut conn, viewer_id, &post.author_id).await?;
        self.item(&mut conn, viewer_id, post).await
    }

    /// Posts of one author, newest first
    pub async fn by_author(
        &self,
        viewer_id: &EntityId,
        author_id: &EntityId,
    ) -> Result<Vec<FeedItem>, AppError> {
        let mut conn = self.db.acquire().await?;
        ensure_visible(&mut conn, viewer_id, author_id).await?;

        let rows =
            posts::by_authors(&mut conn, std::slice::from_ref(author_id), MAX_USER_POSTS).await?;
        let mut items = Vec::with_capacity(rows.len());
        for post in rows {
            items.push(self.item(&mut conn, viewer_id, post).await?);
        }
        Ok(items)
    }

    /// Flip the actor's like; liking notifies the author
    pub async fn toggle_like(
        &self,
        actor_id: &EntityId,
        post_id: &EntityId,
    ) -> Result<LikeOutcome, AppError> {
        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<(LikeOutcome, Option<Notification>), AppError> = async {
            let post = posts::require(&mut *conn, post_id).await?;
            ensure_visible(&mut *conn, actor_id, &post.author_id).await?;

            let liked = posts::toggle_like(&mut *conn, post_id, actor_id).await?;
            let recorded = if liked {
                notification::record(
                    &mut *conn,
                    &post.author_id,
                    actor_id,
                    NotificationKind::Like,
                    Some(post_id),
                )
                .await?
            } else {
                None
            };
            let likes = posts::like_count(&mut *conn, post_id).await?;
            Ok((LikeOutcome { liked, likes }, recorded))
        }
        .await;
        let (outcome, recorded) = tx.finish(result).await?;

        self.notifications.dispatch_all([recorded]).await;
        Ok(outcome)
    }

    pub async fn comment(
        &self,
        actor_id: &EntityId,
        post_id: &EntityId,
        text: &str,
    ) -> Result<CommentView, AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::validation("comment required"));
        }

        let comment = Comment {
            id: EntityId::new(),
            post_id: post_id.clone(),
            user_id: actor_id.clone(),
            text: text.to_string(),
            created_at: Utc::now(),
        };

        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<Option<Notification>, AppError> = async {
            let post = posts::require(&mut *conn, post_id).await?;
            ensure_visible(&mut *conn, actor_id, &post.author_id).await?;
            posts::insert_comment(&mut *conn, &comment).await?;
            notification::record(
                &mut *conn,
                &post.author_id,
                actor_id,
                NotificationKind::Comment,
                Some(post_id),
            )
            .await
        }
        .await;
        let recorded = tx.finish(result).await?;

        self.notifications.dispatch_all([recorded]).await;
        let user = self.profile_cache.require(&self.db, actor_id).await?;
        Ok(CommentView {
            id: comment.id,
            post_id: comment.post_id,
            user: (*user).clone(),
            text: comment.text,
            created_at: comment.created_at,
        })
    }

    /// Comments in the order they were written
    pub async fn comments(
        &self,
        viewer_id: &EntityId,
        post_id: &EntityId,
    ) -> Result<Vec<CommentView>, AppError> {
        let rows = {
            let mut conn = self.db.acquire().await?;
            let post = posts::require(&mut conn, post_id).await?;
            ensure_visible(&mut conn, viewer_id, &post.author_id).await?;
            posts::comments(&mut conn, post_id).await?
        };

        let mut views = Vec::with_capacity(rows.len());
        for comment in rows {
            let user = self.profile_cache.require(&self.db, &comment.user_id).await?;
            views.push(CommentView {
                id: comment.id,
                post_id: comment.post_id,
                user: (*user).clone(),
                text: comment.text,
                created_at: comment.created_at,
            });
        }
        Ok(views)
    }

    /// Create a repost item referencing `post_id`
    ///
    /// # Errors
    /// `Conflict` if the actor already reposted it.
    pub async fn repost(
        &self,
        actor_id: &EntityId,
        post_id: &EntityId,
    ) -> Result<FeedItem, AppError> {
        let id = EntityId::new();

        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<Option<Notification>, AppError> = async {
            let original = posts::require(&mut *conn, post_id).await?;
            ensure_visible(&mut *conn, actor_id, &original.author_id).await?;
            if posts::find_repost(&mut *conn, actor_id, post_id).await?.is_some() {
                return Err(AppError::conflict("already reposted"));
            }

            posts::insert(
                &mut *conn,
                &posts::NewPost {
                    id: &id,
                    author_id: actor_id,
                    content: "",
                    media_url: "",
                    media_type: "none",
                    repost_of: Some(post_id),
                    created_at: Utc::now(),
                },
                &[],
            )
            .await?;
            notification::record(
                &mut *conn,
                &original.author_id,
                actor_id,
                NotificationKind::Repost,
                Some(post_id),
            )
            .await
        }
        .await;
        let recorded = tx.finish(result).await?;

        tracing::info!(
            post_id = %id,
            original_id = %post_id,
            actor_id = %actor_id,
            "Post reposted"
        );
        self.notifications.dispatch_all([recorded]).await;

        let mut conn = self.db.acquire().await?;
        let post = posts::require(&mut conn, &id).await?;
        self.item(&mut conn, actor_id, post).await
    }

    /// Delete an own post, or a repost of a post the actor wrote
    pub async fn delete(&self, actor_id: &EntityId, post_id: &EntityId) -> Result<(), AppError> {
        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<(), AppError> = async {
            let post = posts::require(&mut *conn, post_id).await?;
            if &post.author_id != actor_id {
                let owns_original = match &post.repost_of {
                    Some(original_id) => posts::find(&mut *conn, original_id)
                        .await?
                        .is_some_and(|original| &original.author_id == actor_id),
                    None => false,
                };
                if !owns_original {
                    return Err(AppError::forbidden("not the author"));
                }
            }
            posts::delete(&mut *conn, post_id).await?;
            Ok(())
        }
        .await;
        tx.finish(result).await?;

        tracing::info!(post_id = %post_id, actor_id = %actor_id, "Post deleted");
        Ok(())
    }

    /// Pin an own post to the actor's profile; returns whether it was newly
    /// pinned
    ///
    /// # Errors
    /// `Forbidden` for someone else's post.
    pub async fn pin(&self, actor_id: &EntityId, post_id: &EntityId) -> Result<bool, AppError> {
        let mut conn = self.db.acquire().await?;
        let post = posts::require(&mut conn, post_id).await?;
        if &post.author_id != actor_id {
            return Err(AppError::forbidden("only the author can pin a post"));
        }
        let pinned = posts::list_add(&mut conn, posts::PostList::Pinned, actor_id, post_id).await?;
        tracing::debug!(post_id = %post_id, actor_id = %actor_id, pinned, "Post pinned");
        Ok(pinned)
    }

    pub async fn unpin(&self, actor_id: &EntityId, post_id: &EntityId) -> Result<bool, AppError> {
        let mut conn = self.db.acquire().await?;
        posts::list_remove(&mut conn, posts::PostList::Pinned, actor_id, post_id).await
    }

    /// Posts `owner_id` pinned, most recently pinned first
    pub async fn pinned(
        &self,
        viewer_id: &EntityId,
        owner_id: &EntityId,
    ) -> Result<Vec<FeedItem>, AppError> {
        let mut conn = self.db.acquire().await?;
        ensure_visible(&mut conn, viewer_id, owner_id).await?;
        let rows = posts::list_posts(&mut conn, posts::PostList::Pinned, owner_id).await?;
        let mut items = Vec::with_capacity(rows.len());
        for post in rows {
            items.push(self.item(&mut conn, viewer_id, post).await?);
        }
        Ok(items)
    }

    pub async fn hide(&self, viewer_id: &EntityId, post_id: &EntityId) -> Result<(), AppError> {
        let mut conn = self.db.acquire().await?;
        posts::require(&mut conn, post_id).await?;
        posts::list_add(&mut conn, posts::PostList::Hidden, viewer_id, post_id).await?;
        Ok(())
    }

    pub async fn unhide(&self, viewer_id: &EntityId, post_id: &EntityId) -> Result<(), AppError> {
        let mut conn = self.db.acquire().await?;
        posts::list_remove(&mut conn, posts::PostList::Hidden, viewer_id, post_id).await?;
        Ok(())
    }

    /// Flip the bookmark; returns whether the post is now bookmarked
    pub async fn toggle_bookmark(
        &self,
        viewer_id: &EntityId,
        post_id: &EntityId,
    ) -> Result<bool, AppError> {
        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<bool, AppError> = async {
            posts::require(&mut *conn, post_id).await?;
            let removed =
                posts::list_remove(&mut *conn, posts::PostList::Bookmarks, viewer_id, post_id)
                    .await?;
            if removed {
                return Ok(false);
            }
            posts::list_add(&mut *conn, posts::PostList::Bookmarks, viewer_id, post_id).await?;
            Ok(true)
        }
        .await;
        tx.finish(result).await
    }

    pub async fn bookmarks(&self, viewer_id: &EntityId) -> Result<Vec<FeedItem>, AppError> {
        self.list(viewer_id, posts::PostList::Bookmarks).await
    }

    pub async fn hidden(&self, viewer_id: &EntityId) -> Result<Vec<FeedItem>, AppError> {
        self.list(viewer_id, posts::PostList::Hidden).await
    }

    async fn list(
        &self,
        viewer_id: &EntityId,
        list: posts::PostList,
    ) -> Result<Vec<FeedItem>, AppError> {
        let mut conn = self.db.acquire().await?;
        let rows = posts::list_posts(&mut conn, list, viewer_id).await?;
        let mut items = Vec::with_capacity(rows.len());
        for post in rows {
            items.push(self.item(&mut conn, viewer_id, post).await?);
        }
        Ok(items)
    }

    async fn item(
        &self,
        conn: &mut SqliteConnection,
        viewer_id: &EntityId,
        post: Post,
    ) -> Result<FeedItem, AppError> {
        let author = self.profile_cache.require_on(conn, &post.author_id).await?;
        let liked = posts::is_liked_by(conn, &post.id, viewer_id).await?;
        Ok(FeedItem {
            post,
            author,
            liked,
            score: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashtags_are_lowercased_and_unique() {
        assert_eq!(
            extract_hashtags("Hello #Rust and #rust, also #web_dev!"),
            vec!["#rust".to_string(), "#web_dev".to_string()]
        );
    }

    #[test]
    fn bare_hash_is_not_a_tag() {
        assert!(extract_hashtags("# heading and #").is_empty());
        assert_eq!(extract_hashtags("a##b"), vec!["#b".to_string()]);
    }

    #[test]
    fn non_ascii_ends_a_tag() {
        assert_eq!(extract_hashtags("#café"), vec!["#caf".to_string()]);
    }
}
