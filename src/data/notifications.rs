//! Notification records

use sqlx::SqliteConnection;

use super::models::{EntityId, Notification};
use crate::error::AppError;

pub async fn insert(
    conn: &mut SqliteConnection,
    notification: &Notification,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO notifications (id, user_id, from_id, kind, post_id, read, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&notification.id)
    .bind(&notification.user_id)
    .bind(&notification.from_id)
    .bind(notification.kind)
    .bind(&notification.post_id)
    .bind(notification.read)
    .bind(notification.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Newest first
pub async fn for_user(
    conn: &mut SqliteConnection,
    user_id: &EntityId,
    limit: usize,
) -> Result<Vec<Notification>, AppError> {
    let rows = sqlx::query_as::<_, Notification>(
        r#"
        SELECT id, user_id, from_id, kind, post_id, read, created_at FROM notifications
        WHERE user_id = ?
        ORDER BY created_at DESC, rowid DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(limit as i64)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// Flip every unread notification of `user_id` to read; returns how many changed
pub async fn mark_all_read(
    conn: &mut SqliteConnection,
    user_id: &EntityId,
) -> Result<u64, AppError> {
    let result = sqlx::query("UPDATE notifications SET read = 1 WHERE user_id = ? AND read = 0")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn unread_count(
    conn: &mut SqliteConnection,
    user_id: &EntityId,
) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND read = 0",
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}
