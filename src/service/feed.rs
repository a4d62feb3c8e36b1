//! Feed ranking
//!
//! Three read-only feeds, all visibility-filtered and capped:
//! - personal: self and followed authors, newest first
//! - following: followed authors only, newest first
//! - global: every visible post in a prefetch window, ranked by engagement
//!   and freshness
//!
//! Any post shown to a non-author for the first time gets one view.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use super::visibility::{Audience, ViewerEdges, can_view};
use crate::config::FeedConfig;
use crate::data::{Database, EntityId, Post, ProfileCache, UserSummary, posts, users};
use crate::error::AppError;
use crate::metrics::FEED_REQUESTS;

/// A post ready to render
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub post: Post,
    pub author: Arc<UserSummary>,
    pub liked: bool,
    /// Present on ranked feeds
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Personal,
    Following,
    Global,
}

impl FeedKind {
    fn label(&self) -> &'static str {
        match self {
            FeedKind::Personal => "personal",
            FeedKind::Following => "following",
            FeedKind::Global => "global",
        }
    }
}

/// Engagement plus a freshness bonus that fades over the first day
pub fn rank_score(likes: i64, comments: i64, age_hours: f64) -> f64 {
    (likes * 2) as f64 + (comments * 3) as f64 + (24.0 - age_hours).max(0.0)
}

fn age_hours(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - created_at).num_milliseconds().max(0) as f64 / 3_600_000.0
}

/// Clamp a caller-supplied limit into `1..=cap`; missing means `cap`
pub fn clamp_limit(requested: Option<i64>, cap: usize) -> usize {
    match requested {
        None => cap,
        Some(n) if n < 1 => 1,
        Some(n) => (n as usize).min(cap),
    }
}

/// Sort by score descending, then newest first
fn rank(posts: Vec<Post>, now: DateTime<Utc>) -> Vec<(Post, f64)> {
    let mut scored: Vec<(Post, f64)> = posts
        .into_iter()
        .map(|post| {
            let score = rank_score(
                post.like_count,
                post.comment_count,
                age_hours(post.created_at, now),
            );
            (post, score)
        })
        .collect();

    scored.sort_by(|(a, a_score), (b, b_score)| {
        b_score
            .total_cmp(a_score)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    scored
}

/// Feed service
pub struct FeedService {
    db: Arc<Database>,
    profile_cache: Arc<ProfileCache>,
    config: FeedConfig,
}

impl FeedService {
    pub fn new(db: Arc<Database>, profile_cache: Arc<ProfileCache>, config: FeedConfig) -> Self {
        Self {
            db,
            profile_cache,
            config,
        }
    }

    /// Posts by the viewer and everyone they follow, minus muted authors and
    /// hidden posts
    pub async fn personal(
        &self,
        viewer_id: &EntityId,
        limit: Option<i64>,
    ) -> Result<Vec<FeedItem>, AppError> {
        self.chronological(viewer_id, limit, FeedKind::Personal).await
    }

    /// Like [`personal`](Self::personal) without the viewer's own posts
    pub async fn following(
        &self,
        viewer_id: &EntityId,
        limit: Option<i64>,
    ) -> Result<Vec<FeedItem>, AppError> {
        self.chronological(viewer_id, limit, FeedKind::Following).await
    }

    /// Every visible post in the prefetch window, ranked
    pub async fn global(
        &self,
        viewer_id: &EntityId,
        limit: Option<i64>,
    ) -> Result<Vec<FeedItem>, AppError> {
        FEED_REQUESTS.with_label_values(&[FeedKind::Global.label()]).inc();
        let limit = clamp_limit(limit, self.config.page_size);
        let edges = ViewerEdges::load(&self.db, viewer_id).await?;

        let candidates = {
            let mut conn = self.db.acquire().await?;
            posts::recent(&mut conn, viewer_id, self.config.global_prefetch).await?
        };
        let visible = self.filter_visible(&edges, candidates).await?;

        let ranked: Vec<(Post, Option<f64>)> = rank(visible, Utc::now())
            .into_iter()
            .take(limit)
            .map(|(post, score)| (post, Some(score)))
            .collect();

        self.present(viewer_id, ranked).await
    }

    async fn chronological(
        &self,
        viewer_id: &EntityId,
        limit: Option<i64>,
        kind: FeedKind,
    ) -> Result<Vec<FeedItem>, AppError> {
        FEED_REQUESTS.with_label_values(&[kind.label()]).inc();
        let limit = clamp_limit(limit, self.config.page_size);
        let edges = ViewerEdges::load(&self.db, viewer_id).await?;

        let mut authors: Vec<EntityId> = edges.following.iter().cloned().collect();
        if kind == FeedKind::Personal {
            authors.push(viewer_id.clone());
        }
        authors.retain(|author| !edges.muted.contains(author) && !edges.is_blocked_either(author));

        // Over-fetch by the hidden count so filtering cannot starve the page
        let fetch = limit + edges.hidden_posts.len();
        let candidates = {
            let mut conn = self.db.acquire().await?;
            posts::by_authors(&mut conn, &authors, fetch).await?
        };

        let items: Vec<(Post, Option<f64>)> = self
            .filter_visible(&edges, candidates)
            .await?
            .into_iter()
            .take(limit)
            .map(|post| (post, None))
            .collect();

        self.present(viewer_id, items).await
    }

    /// Drop hidden posts and posts whose author the viewer may not see
    async fn filter_visible(
        &self,
        edges: &ViewerEdges,
        candidates: Vec<Post>,
    ) -> Result<Vec<Post>, AppError> {
        let mut author_ids: Vec<EntityId> =
            candidates.iter().map(|p| p.author_id.clone()).collect();
        author_ids.sort();
        author_ids.dedup();

        let private = {
            let mut conn = self.db.acquire().await?;
            users::private_among(&mut conn, &author_ids).await?
        };

        Ok(candidates
            .into_iter()
            .filter(|post| !edges.hidden_posts.contains(&post.id))
            .filter(|post| {
                can_view(
                    edges,
                    &post.author_id,
                    private.contains(&post.author_id),
                    Audience::Feed,
                )
            })
            .collect())
    }

    /// Attach author summaries and like state, then record first views
    async fn present(
        &self,
        viewer_id: &EntityId,
        items: Vec<(Post, Option<f64>)>,
    ) -> Result<Vec<FeedItem>, AppError> {
        let post_ids: Vec<EntityId> = items.iter().map(|(post, _)| post.id.clone()).collect();
        let liked = {
            let mut conn = self.db.acquire().await?;
            posts::liked_among(&mut conn, viewer_id, &post_ids).await?
        };

        let newly_viewed = self.record_views(viewer_id, &items).await?;

        let mut authors: HashMap<EntityId, Arc<UserSummary>> = HashMap::new();
        let mut feed = Vec::with_capacity(items.len());
        for (mut post, score) in items {
            let author = match authors.get(&post.author_id) {
                Some(author) => author.clone(),
                None => {
                    let author = self.profile_cache.require(&self.db, &post.author_id).await?;
                    authors.insert(post.author_id.clone(), author.clone());
                    author
                }
            };
            if newly_viewed.contains(&post.id) {
                post.views += 1;
            }
            feed.push(FeedItem {
                liked: liked.contains(&post.id),
                post,
                author,
                score,
            });
        }
        Ok(feed)
    }

    /// One transaction for the whole page; returns posts whose counter moved
    async fn record_views(
        &self,
        viewer_id: &EntityId,
        items: &[(Post, Option<f64>)],
    ) -> Result<Vec<EntityId>, AppError> {
        let unseen: Vec<&EntityId> = items
            .iter()
            .filter(|(post, _)| &post.author_id != viewer_id)
            .map(|(post, _)| &post.id)
            .collect();
        if unseen.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<Vec<EntityId>, AppError> = async {
            let mut counted = Vec::new();
            for post_id in unseen {
                if posts::record_view(&mut *conn, post_id, viewer_id).await? {
                    counted.push(post_id.clone());
                }
            }
            Ok(counted)
        }
        .await;
        tx.finish(result).await
    }
}
