//! User rows and presence columns

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::models::{EntityId, PresenceStatus, User, UserSummary};
use crate::error::AppError;

const USER_COLUMNS: &str =
    "id, username, user_tag, avatar, bio, is_private, status, last_seen, created_at";

pub async fn find(conn: &mut SqliteConnection, id: &EntityId) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(user)
}

/// Like [`find`] but `NotFound` when absent
pub async fn require(conn: &mut SqliteConnection, id: &EntityId) -> Result<User, AppError> {
    find(conn, id).await?.ok_or(AppError::NotFound)
}

pub async fn exists(conn: &mut SqliteConnection, id: &EntityId) -> Result<bool, AppError> {
    let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

pub async fn find_summary(
    conn: &mut SqliteConnection,
    id: &EntityId,
) -> Result<Option<UserSummary>, AppError> {
    let summary = sqlx::query_as::<_, UserSummary>(
        "SELECT id, username, user_tag, avatar FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(summary)
}

/// Insert a user row. Account creation belongs to the identity service;
/// this exists for provisioning and tests.
pub async fn insert(conn: &mut SqliteConnection, user: &User) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        INSERT INTO users
            (id, username, user_tag, avatar, bio, is_private, status, last_seen, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.id)
    .bind(&user.username)
    .bind(&user.user_tag)
    .bind(&user.avatar)
    .bind(&user.bio)
    .bind(user.is_private)
    .bind(user.status)
    .bind(user.last_seen)
    .bind(user.created_at)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
            Err(AppError::conflict("user tag is already taken"))
        }
        Err(error) => Err(error.into()),
    }
}

/// Whole-field overwrite of the editable profile fields
pub async fn update_profile(
    conn: &mut SqliteConnection,
    id: &EntityId,
    username: &str,
    bio: &str,
    avatar: &str,
    is_private: bool,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE users SET username = ?, bio = ?, avatar = ?, is_private = ? WHERE id = ?",
    )
    .bind(username)
    .bind(bio)
    .bind(avatar)
    .bind(is_private)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_presence(
    conn: &mut SqliteConnection,
    id: &EntityId,
    status: PresenceStatus,
    last_seen: Option<DateTime<Utc>>,
) -> Result<(), AppError> {
    sqlx::query("UPDATE users SET status = ?, last_seen = COALESCE(?, last_seen) WHERE id = ?")
        .bind(status)
        .bind(last_seen)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Mark every user offline; run at startup, before any session registers
pub async fn reset_presence(conn: &mut SqliteConnection) -> Result<u64, AppError> {
    let result = sqlx::query("UPDATE users SET status = ? WHERE status = ?")
        .bind(PresenceStatus::Offline)
        .bind(PresenceStatus::Online)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Summaries for a set of ids, in no particular order
pub async fn summaries(
    conn: &mut SqliteConnection,
    ids: &[EntityId],
) -> Result<Vec<UserSummary>, AppError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder =
        sqlx::QueryBuilder::new("SELECT id, username, user_tag, avatar FROM users WHERE id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let rows = builder
        .build_query_as::<UserSummary>()
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows)
}

/// Users whose username or tag contains `query`, by tag
pub async fn search(
    conn: &mut SqliteConnection,
    query: &str,
    limit: usize,
) -> Result<Vec<UserSummary>, AppError> {
    let pattern = super::like_contains(query);
    let rows = sqlx::query_as::<_, UserSummary>(
        r#"
        SELECT id, username, user_tag, avatar FROM users
        WHERE username LIKE ?1 ESCAPE '\' OR user_tag LIKE ?1 ESCAPE '\'
        ORDER BY user_tag ASC
        LIMIT ?2
        "#,
    )
    .bind(pattern)
    .bind(limit as i64)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// The subset of `ids` whose profiles are private
pub async fn private_among(
    conn: &mut SqliteConnection,
    ids: &[EntityId],
) -> Result<std::collections::HashSet<EntityId>, AppError> {
    if ids.is_empty() {
        return Ok(Default::default());
    }

    let mut builder =
        sqlx::QueryBuilder::new("SELECT id FROM users WHERE is_private = 1 AND id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(")");

    let rows = builder
        .build_query_scalar::<EntityId>()
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().collect())
}
