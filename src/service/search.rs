//! Lookup by substring
//!
//! Users by username or tag, posts by content, hashtags by use. Results are
//! filtered through the same visibility policy as the global feed but are
//! not ranked, and reading them does not count as a view.

use std::sync::Arc;

use super::feed::FeedItem;
use super::visibility::{Audience, ViewerEdges, can_view};
use crate::data::{Database, EntityId, HashtagCount, ProfileCache, UserSummary, posts, users};
use crate::error::AppError;

const USER_LIMIT: usize = 20;
const POST_LIMIT: usize = 20;
const HASHTAG_LIMIT: usize = 10;
/// Candidates fetched per returned post, so filtering rarely starves a page
const POST_OVERFETCH: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub users: Vec<UserSummary>,
    /// Newest first
    pub posts: Vec<FeedItem>,
    pub hashtags: Vec<HashtagCount>,
}

pub struct SearchService {
    db: Arc<Database>,
    profile_cache: Arc<ProfileCache>,
}

impl SearchService {
    pub fn new(db: Arc<Database>, profile_cache: Arc<ProfileCache>) -> Self {
        Self { db, profile_cache }
    }

    /// A blank query matches nothing
    pub async fn search(
        &self,
        viewer_id: &EntityId,
        query: &str,
    ) -> Result<SearchResults, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchResults::default());
        }

        let edges = ViewerEdges::load(&self.db, viewer_id).await?;
        let mut conn = self.db.acquire().await?;

        let found_users: Vec<UserSummary> = users::search(&mut conn, query, USER_LIMIT)
            .await?
            .into_iter()
            .filter(|user| !edges.is_blocked_either(&user.id))
            .collect();

        let candidates = posts::search(&mut conn, query, POST_LIMIT * POST_OVERFETCH).await?;
        let mut author_ids: Vec<EntityId> =
            candidates.iter().map(|post| post.author_id.clone()).collect();
        author_ids.sort();
        author_ids.dedup();
        let private = users::private_among(&mut conn, &author_ids).await?;

        let visible: Vec<_> = candidates
            .into_iter()
            .filter(|post| !edges.hidden_posts.contains(&post.id))
            .filter(|post| {
                can_view(
                    &edges,
                    &post.author_id,
                    private.contains(&post.author_id),
                    Audience::Feed,
                )
            })
            .take(POST_LIMIT)
            .collect();

        let post_ids: Vec<EntityId> = visible.iter().map(|post| post.id.clone()).collect();
        let liked = posts::liked_among(&mut conn, viewer_id, &post_ids).await?;
        let mut found_posts = Vec::with_capacity(visible.len());
        for post in visible {
            let author = self.profile_cache.require_on(&mut conn, &post.author_id).await?;
            found_posts.push(FeedItem {
                liked: liked.contains(&post.id),
                post,
                author,
                score: None,
            });
        }

        let hashtags = posts::top_hashtags(&mut conn, query, HASHTAG_LIMIT).await?;

        tracing::debug!(
            viewer_id = %viewer_id,
            users = found_users.len(),
            posts = found_posts.len(),
            hashtags = hashtags.len(),
            "Search served"
        );
        Ok(SearchResults {
            users: found_users,
            posts: found_posts,
            hashtags,
        })
    }
}
