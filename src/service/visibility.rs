//! Visibility policy
//!
//! Pure decisions over a pre-fetched snapshot of the viewer's edges. No I/O
//! happens here; callers load a [`ViewerEdges`] once and test many authors
//! against it.

use sqlx::SqliteConnection;
use std::collections::HashSet;

use crate::data::{Database, EntityId, graph, posts, users};
use crate::error::AppError;

/// How the content is reaching the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Inclusion in a feed or listing; mutes apply
    Feed,
    /// Explicitly addressed (profile view, direct message); mutes do not apply
    Direct,
}

/// Graph edges of one viewer at the time of the request
#[derive(Debug, Clone, Default)]
pub struct ViewerEdges {
    pub viewer_id: EntityId,
    pub following: HashSet<EntityId>,
    pub muted: HashSet<EntityId>,
    /// Users the viewer blocks
    pub blocked: HashSet<EntityId>,
    /// Users who block the viewer
    pub blocked_by: HashSet<EntityId>,
    pub hidden_posts: HashSet<EntityId>,
}

impl ViewerEdges {
    /// Snapshot for `viewer_id`
    pub async fn load(db: &Database, viewer_id: &EntityId) -> Result<Self, AppError> {
        let mut conn = db.acquire().await?;
        let following = graph::outgoing(&mut conn, graph::Edge::Follow, viewer_id).await?;
        let muted = graph::outgoing(&mut conn, graph::Edge::Mute, viewer_id).await?;
        let blocked = graph::outgoing(&mut conn, graph::Edge::Block, viewer_id).await?;
        let blocked_by = graph::incoming(&mut conn, graph::Edge::Block, viewer_id).await?;
        let hidden_posts = posts::list_ids(&mut conn, posts::PostList::Hidden, viewer_id).await?;

        Ok(Self {
            viewer_id: viewer_id.clone(),
            following: following.into_iter().collect(),
            muted: muted.into_iter().collect(),
            blocked: blocked.into_iter().collect(),
            blocked_by: blocked_by.into_iter().collect(),
            hidden_posts: hidden_posts.into_iter().collect(),
        })
    }

    pub fn is_blocked_either(&self, other: &EntityId) -> bool {
        self.blocked.contains(other) || self.blocked_by.contains(other)
    }
}

/// May the viewer see content produced by `author_id`?
///
/// Precedence: a block in either direction hides everything; a mute hides
/// feed inclusion only; a private author is visible to followers and
/// themselves.
pub fn can_view(
    edges: &ViewerEdges,
    author_id: &EntityId,
    author_is_private: bool,
    audience: Audience,
) -> bool {
    if edges.is_blocked_either(author_id) {
        return false;
    }
    if audience == Audience::Feed && edges.muted.contains(author_id) {
        return false;
    }
    if author_is_private && &edges.viewer_id != author_id && !edges.following.contains(author_id) {
        return false;
    }
    true
}

/// Apply the policy for direct addressing between two users, loading only
/// the edges that matter
///
/// # Errors
/// `NotFound` if the author does not exist, `Forbidden` if the viewer may not
/// see them.
pub async fn ensure_visible(
    conn: &mut SqliteConnection,
    viewer_id: &EntityId,
    author_id: &EntityId,
) -> Result<(), AppError> {
    let author = users::require(conn, author_id).await?;
    if viewer_id == author_id {
        return Ok(());
    }

    let mut edges = ViewerEdges {
        viewer_id: viewer_id.clone(),
        ..Default::default()
    };
    if graph::has_edge(conn, graph::Edge::Block, viewer_id, author_id).await? {
        edges.blocked.insert(author_id.clone());
    }
    if graph::has_edge(conn, graph::Edge::Block, author_id, viewer_id).await? {
        edges.blocked_by.insert(author_id.clone());
    }
    if graph::has_edge(conn, graph::Edge::Follow, viewer_id, author_id).await? {
        edges.following.insert(author_id.clone());
    }

    if can_view(&edges, author_id, author.is_private, Audience::Direct) {
        return Ok(());
    }
    if edges.is_blocked_either(author_id) {
        Err(AppError::forbidden("blocked"))
    } else {
        Err(AppError::forbidden("private profile"))
    }
}
