//! Posts, likes, comments, views, hashtags, and the per-user hidden, bookmark
//! and pin lists

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::models::{Comment, EntityId, HashtagCount, Post};
use crate::error::AppError;

/// Post columns plus derived counts; every post query selects through this
const POST_SELECT: &str = r#"
    SELECT p.id, p.author_id, p.content, p.media_url, p.media_type, p.repost_of, p.views,
           (SELECT COUNT(*) FROM post_likes l WHERE l.post_id = p.id) AS like_count,
           (SELECT COUNT(*) FROM post_comments c WHERE c.post_id = p.id) AS comment_count,
           p.created_at
    FROM posts p
"#;

/// Fields of a post being created
#[derive(Debug, Clone)]
pub struct NewPost<'a> {
    pub id: &'a EntityId,
    pub author_id: &'a EntityId,
    pub content: &'a str,
    pub media_url: &'a str,
    pub media_type: &'a str,
    pub repost_of: Option<&'a EntityId>,
    pub created_at: DateTime<Utc>,
}

pub async fn find(conn: &mut SqliteConnection, id: &EntityId) -> Result<Option<Post>, AppError> {
    let post = sqlx::query_as::<_, Post>(&format!("{POST_SELECT} WHERE p.id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(post)
}

pub async fn require(conn: &mut SqliteConnection, id: &EntityId) -> Result<Post, AppError> {
    find(conn, id).await?.ok_or(AppError::NotFound)
}

/// Insert a post and its hashtags
///
/// A second repost of the same original by the same author violates the
/// single-repost index and surfaces as `Conflict`.
pub async fn insert(
    conn: &mut SqliteConnection,
    post: &NewPost<'_>,
    hashtags: &[String],
) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        INSERT INTO posts
            (id, author_id, content, media_url, media_type, repost_of, views, created_at)
        VALUES (?, ?, ?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(post.id)
    .bind(post.author_id)
    .bind(post.content)
    .bind(post.media_url)
    .bind(post.media_type)
    .bind(post.repost_of)
    .bind(post.created_at)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => {}
        Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
            return Err(AppError::conflict("already reposted"));
        }
        Err(error) => return Err(error.into()),
    }

    for tag in hashtags {
        sqlx::query("INSERT OR IGNORE INTO post_hashtags (post_id, tag) VALUES (?, ?)")
            .bind(post.id)
            .bind(tag)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

pub async fn delete(conn: &mut SqliteConnection, id: &EntityId) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn find_repost(
    conn: &mut SqliteConnection,
    author_id: &EntityId,
    original_id: &EntityId,
) -> Result<Option<EntityId>, AppError> {
    let id = sqlx::query_scalar::<_, EntityId>(
        "SELECT id FROM posts WHERE author_id = ? AND repost_of = ?",
    )
    .bind(author_id)
    .bind(original_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(id)
}

/// Newest posts by any of `authors`, newest first
pub async fn by_authors(
    conn: &mut SqliteConnection,
    authors: &[EntityId],
    limit: usize,
) -> Result<Vec<Post>, AppError> {
    if authors.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder = sqlx::QueryBuilder::new(POST_SELECT);
    builder.push(" WHERE p.author_id IN (");
    let mut separated = builder.separated(", ");
    for author in authors {
        separated.push_bind(author);
    }
    separated.push_unseparated(")");
    builder.push(" ORDER BY p.created_at DESC, p.rowid DESC LIMIT ");
    builder.push_bind(limit as i64);

    let posts = builder.build_query_as::<Post>().fetch_all(&mut *conn).await?;
    Ok(posts)
}

/// Newest posts overall, excluding ones the viewer hid
pub async fn recent(
    conn: &mut SqliteConnection,
    viewer_id: &EntityId,
    limit: usize,
) -> Result<Vec<Post>, AppError> {
    let posts = sqlx::query_as::<_, Post>(&format!(
        r#"{POST_SELECT}
        WHERE p.id NOT IN (SELECT post_id FROM hidden_posts WHERE user_id = ?)
        ORDER BY p.created_at DESC, p.rowid DESC
        LIMIT ?"#
    ))
    .bind(viewer_id)
    .bind(limit as i64)
    .fetch_all(&mut *conn)
    .await?;
    Ok(posts)
}

/// Newest posts whose content contains `query`, case-insensitively for ASCII
pub async fn search(
    conn: &mut SqliteConnection,
    query: &str,
    limit: usize,
) -> Result<Vec<Post>, AppError> {
    let posts = sqlx::query_as::<_, Post>(&format!(
        r#"{POST_SELECT}
        WHERE p.content LIKE ? ESCAPE '\'
        ORDER BY p.created_at DESC, p.rowid DESC
        LIMIT ?"#
    ))
    .bind(super::like_contains(query))
    .bind(limit as i64)
    .fetch_all(&mut *conn)
    .await?;
    Ok(posts)
}

/// Hashtags containing `query`, most used first
pub async fn top_hashtags(
    conn: &mut SqliteConnection,
    query: &str,
    limit: usize,
) -> Result<Vec<HashtagCount>, AppError> {
    let tags = sqlx::query_as::<_, HashtagCount>(
        r#"
        SELECT tag, COUNT(*) AS count FROM post_hashtags
        WHERE tag LIKE ? ESCAPE '\'
        GROUP BY tag
        ORDER BY count DESC, tag ASC
        LIMIT ?
        "#,
    )
    .bind(super::like_contains(&query.to_lowercase()))
    .bind(limit as i64)
    .fetch_all(&mut *conn)
    .await?;
    Ok(tags)
}

/// Record a first view by `viewer_id`
///
/// The view row and the counter move together: the counter is only bumped
/// when the `(post, viewer)` row was actually inserted. Run inside an
/// immediate transaction.
pub async fn record_view(
    conn: &mut SqliteConnection,
    post_id: &EntityId,
    viewer_id: &EntityId,
) -> Result<bool, AppError> {
    let inserted = sqlx::query("INSERT OR IGNORE INTO post_views (post_id, user_id) VALUES (?, ?)")
        .bind(post_id)
        .bind(viewer_id)
        .execute(&mut *conn)
        .await?;

    if inserted.rows_affected() == 0 {
        return Ok(false);
    }

    sqlx::query("UPDATE posts SET views = views + 1 WHERE id = ?")
        .bind(post_id)
        .execute(&mut *conn)
        .await?;
    Ok(true)
}

/// Flip the like of `user_id` on `post_id`; returns the new liked state
pub async fn toggle_like(
    conn: &mut SqliteConnection,
    post_id: &EntityId,
    user_id: &EntityId,
) -> Result<bool, AppError> {
    let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = ? AND user_id = ?")
        .bind(post_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    if removed.rows_affected() > 0 {
        return Ok(false);
    }

    sqlx::query("INSERT INTO post_likes (post_id, user_id, created_at) VALUES (?, ?, ?)")
        .bind(post_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;
    Ok(true)
}

pub async fn like_count(conn: &mut SqliteConnection, post_id: &EntityId) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM post_likes WHERE post_id = ?")
        .bind(post_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

pub async fn is_liked_by(
    conn: &mut SqliteConnection,
    post_id: &EntityId,
    user_id: &EntityId,
) -> Result<bool, AppError> {
    let found =
        sqlx::query_scalar::<_, i64>("SELECT 1 FROM post_likes WHERE post_id = ? AND user_id = ?")
            .bind(post_id)
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(found.is_some())
}

pub async fn insert_comment(
    conn: &mut SqliteConnection,
    comment: &Comment,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO post_comments (id, post_id, user_id, text, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&comment.id)
    .bind(&comment.post_id)
    .bind(&comment.user_id)
    .bind(&comment.text)
    .bind(comment.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn comments(
    conn: &mut SqliteConnection,
    post_id: &EntityId,
) -> Result<Vec<Comment>, AppError> {
    let rows = sqlx::query_as::<_, Comment>(
        r#"
        SELECT id, post_id, user_id, text, created_at FROM post_comments
        WHERE post_id = ?
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(post_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

// =============================================================================
// Per-user post lists
// =============================================================================

/// Tables keyed by `(user_id, post_id)`
#[derive(Debug, Clone, Copy)]
pub enum PostList {
    Hidden,
    Bookmarks,
    /// Owned by the post's author
    Pinned,
}

impl PostList {
    fn table(&self) -> &'static str {
        match self {
            PostList::Hidden => "hidden_posts",
            PostList::Bookmarks => "bookmarks",
            PostList::Pinned => "pinned_posts",
        }
    }
}

pub async fn list_add(
    conn: &mut SqliteConnection,
    list: PostList,
    user_id: &EntityId,
    post_id: &EntityId,
) -> Result<bool, AppError> {
    let result = sqlx::query(&format!(
        "INSERT OR IGNORE INTO {} (user_id, post_id, created_at) VALUES (?, ?, ?)",
        list.table()
    ))
    .bind(user_id)
    .bind(post_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_remove(
    conn: &mut SqliteConnection,
    list: PostList,
    user_id: &EntityId,
    post_id: &EntityId,
) -> Result<bool, AppError> {
    let result = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = ? AND post_id = ?",
        list.table()
    ))
    .bind(user_id)
    .bind(post_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn list_ids(
    conn: &mut SqliteConnection,
    list: PostList,
    user_id: &EntityId,
) -> Result<Vec<EntityId>, AppError> {
    let ids = sqlx::query_scalar::<_, EntityId>(&format!(
        "SELECT post_id FROM {} WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
        list.table()
    ))
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids)
}

/// Posts on one of the viewer's lists, most recently added first
pub async fn list_posts(
    conn: &mut SqliteConnection,
    list: PostList,
    user_id: &EntityId,
) -> Result<Vec<Post>, AppError> {
    let posts = sqlx::query_as::<_, Post>(&format!(
        r#"{POST_SELECT}
        JOIN {table} l ON l.post_id = p.id
        WHERE l.user_id = ?
        ORDER BY l.created_at DESC, l.rowid DESC"#,
        table = list.table()
    ))
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(posts)
}

/// The subset of `post_ids` liked by `user_id`
pub async fn liked_among(
    conn: &mut SqliteConnection,
    user_id: &EntityId,
    post_ids: &[EntityId],
) -> Result<std::collections::HashSet<EntityId>, AppError> {
    if post_ids.is_empty() {
        return Ok(Default::default());
    }

    let mut builder = sqlx::QueryBuilder::new("SELECT post_id FROM post_likes WHERE user_id = ");
    builder.push_bind(user_id);
    builder.push(" AND post_id IN (");
    let mut separated = builder.separated(", ");
    for id in post_ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let rows = builder
        .build_query_scalar::<EntityId>()
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().collect())
}
