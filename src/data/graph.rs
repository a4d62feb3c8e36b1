//! Social graph edges: follows, follow requests, blocks and mutes
//!
//! Every edge is a row keyed by the ordered pair, so inserting an existing
//! edge or deleting a missing one is a no-op reported through the returned
//! `bool`.

use chrono::Utc;
use sqlx::SqliteConnection;

use super::models::{EntityId, UserSummary};
use crate::error::AppError;

/// Edge tables that share the `(source, target, created_at)` shape
#[derive(Debug, Clone, Copy)]
pub enum Edge {
    Follow,
    FollowRequest,
    Block,
    Mute,
}

impl Edge {
    fn table(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            Edge::Follow => ("follows", "follower_id", "followee_id"),
            Edge::FollowRequest => ("follow_requests", "requester_id", "target_id"),
            Edge::Block => ("blocks", "blocker_id", "blocked_id"),
            Edge::Mute => ("mutes", "muter_id", "muted_id"),
        }
    }
}

/// Insert `from -> to`; returns false if it already existed
pub async fn insert_edge(
    conn: &mut SqliteConnection,
    edge: Edge,
    from: &EntityId,
    to: &EntityId,
) -> Result<bool, AppError> {
    let (table, source, target) = edge.table();
    let result = sqlx::query(&format!(
        "INSERT OR IGNORE INTO {table} ({source}, {target}, created_at) VALUES (?, ?, ?)"
    ))
    .bind(from)
    .bind(to)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete `from -> to`; returns false if there was nothing to delete
pub async fn delete_edge(
    conn: &mut SqliteConnection,
    edge: Edge,
    from: &EntityId,
    to: &EntityId,
) -> Result<bool, AppError> {
    let (table, source, target) = edge.table();
    let result = sqlx::query(&format!(
        "DELETE FROM {table} WHERE {source} = ? AND {target} = ?"
    ))
    .bind(from)
    .bind(to)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn has_edge(
    conn: &mut SqliteConnection,
    edge: Edge,
    from: &EntityId,
    to: &EntityId,
) -> Result<bool, AppError> {
    let (table, source, target) = edge.table();
    let found = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT 1 FROM {table} WHERE {source} = ? AND {target} = ?"
    ))
    .bind(from)
    .bind(to)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(found.is_some())
}

/// Targets of every `user -> *` edge of this kind
pub async fn outgoing(
    conn: &mut SqliteConnection,
    edge: Edge,
    user: &EntityId,
) -> Result<Vec<EntityId>, AppError> {
    let (table, source, target) = edge.table();
    let ids = sqlx::query_scalar::<_, EntityId>(&format!(
        "SELECT {target} FROM {table} WHERE {source} = ?"
    ))
    .bind(user)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids)
}

/// Sources of every `* -> user` edge of this kind
pub async fn incoming(
    conn: &mut SqliteConnection,
    edge: Edge,
    user: &EntityId,
) -> Result<Vec<EntityId>, AppError> {
    let (table, source, target) = edge.table();
    let ids = sqlx::query_scalar::<_, EntityId>(&format!(
        "SELECT {source} FROM {table} WHERE {target} = ?"
    ))
    .bind(user)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids)
}

pub async fn count_outgoing(
    conn: &mut SqliteConnection,
    edge: Edge,
    user: &EntityId,
) -> Result<i64, AppError> {
    let (table, source, _) = edge.table();
    let count = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM {table} WHERE {source} = ?"
    ))
    .bind(user)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

pub async fn count_incoming(
    conn: &mut SqliteConnection,
    edge: Edge,
    user: &EntityId,
) -> Result<i64, AppError> {
    let (table, _, target) = edge.table();
    let count = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM {table} WHERE {target} = ?"
    ))
    .bind(user)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

/// True if either user blocks the other
pub async fn is_blocked_either(
    conn: &mut SqliteConnection,
    a: &EntityId,
    b: &EntityId,
) -> Result<bool, AppError> {
    let found = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT 1 FROM blocks
        WHERE (blocker_id = ? AND blocked_id = ?) OR (blocker_id = ? AND blocked_id = ?)
        LIMIT 1
        "#,
    )
    .bind(a)
    .bind(b)
    .bind(b)
    .bind(a)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(found.is_some())
}

/// Remove follows and pending follow requests between `a` and `b` in both
/// directions
pub async fn sever(
    conn: &mut SqliteConnection,
    a: &EntityId,
    b: &EntityId,
) -> Result<(), AppError> {
    for edge in [Edge::Follow, Edge::FollowRequest] {
        delete_edge(conn, edge, a, b).await?;
        delete_edge(conn, edge, b, a).await?;
    }
    Ok(())
}

/// Pending inbound follow requests, oldest first
pub async fn pending_requests(
    conn: &mut SqliteConnection,
    target: &EntityId,
) -> Result<Vec<UserSummary>, AppError> {
    let rows = sqlx::query_as::<_, UserSummary>(
        r#"
        SELECT u.id, u.username, u.user_tag, u.avatar
        FROM follow_requests r
        JOIN users u ON u.id = r.requester_id
        WHERE r.target_id = ?
        ORDER BY r.created_at ASC, r.rowid ASC
        "#,
    )
    .bind(target)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}
