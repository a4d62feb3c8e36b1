//! Clans, memberships, join requests and invites
//!
//! `clan_memberships` is the only record of who belongs where. A user's clan
//! and role and a clan's member list are both read from it, so the two views
//! can never disagree.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::models::{Clan, ClanInvite, ClanRole, EntityId, JoinRequest, Membership};
use crate::error::AppError;

pub async fn find(conn: &mut SqliteConnection, name: &str) -> Result<Option<Clan>, AppError> {
    let clan = sqlx::query_as::<_, Clan>(
        "SELECT name, motto, announcement, is_private, created_at FROM clans WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(clan)
}

pub async fn require(conn: &mut SqliteConnection, name: &str) -> Result<Clan, AppError> {
    find(conn, name).await?.ok_or(AppError::NotFound)
}

pub async fn insert(conn: &mut SqliteConnection, clan: &Clan) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        INSERT INTO clans (name, motto, announcement, is_private, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&clan.name)
    .bind(&clan.motto)
    .bind(&clan.announcement)
    .bind(clan.is_private)
    .bind(clan.created_at)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
            Err(AppError::conflict("clan name is taken"))
        }
        Err(error) => Err(error.into()),
    }
}

/// Delete the clan; memberships, requests and invites cascade
pub async fn delete(conn: &mut SqliteConnection, name: &str) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM clans WHERE name = ?")
        .bind(name)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn update_settings(
    conn: &mut SqliteConnection,
    name: &str,
    motto: &str,
    announcement: &str,
    is_private: bool,
) -> Result<(), AppError> {
    sqlx::query("UPDATE clans SET motto = ?, announcement = ?, is_private = ? WHERE name = ?")
        .bind(motto)
        .bind(announcement)
        .bind(is_private)
        .bind(name)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// =============================================================================
// Memberships
// =============================================================================

pub async fn membership_of(
    conn: &mut SqliteConnection,
    user_id: &EntityId,
) -> Result<Option<Membership>, AppError> {
    let membership = sqlx::query_as::<_, Membership>(
        "SELECT user_id, clan_name, role, joined_at FROM clan_memberships WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(membership)
}

/// Members in join order
pub async fn members(conn: &mut SqliteConnection, name: &str) -> Result<Vec<Membership>, AppError> {
    let rows = sqlx::query_as::<_, Membership>(
        r#"
        SELECT user_id, clan_name, role, joined_at FROM clan_memberships
        WHERE clan_name = ?
        ORDER BY joined_at ASC, rowid ASC
        "#,
    )
    .bind(name)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn member_count(conn: &mut SqliteConnection, name: &str) -> Result<i64, AppError> {
    let count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM clan_memberships WHERE clan_name = ?")
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;
    Ok(count)
}

/// Add `user_id` to the clan. Fails with `Conflict` if the user already
/// belongs to a clan.
pub async fn insert_membership(
    conn: &mut SqliteConnection,
    user_id: &EntityId,
    clan_name: &str,
    role: ClanRole,
    joined_at: DateTime<Utc>,
) -> Result<(), AppError> {
    let result = sqlx::query(
        "INSERT INTO clan_memberships (user_id, clan_name, role, joined_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(clan_name)
    .bind(role)
    .bind(joined_at)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
            Err(AppError::conflict("already in a clan"))
        }
        Err(error) => Err(error.into()),
    }
}

pub async fn delete_membership(
    conn: &mut SqliteConnection,
    user_id: &EntityId,
) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM clan_memberships WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_role(
    conn: &mut SqliteConnection,
    user_id: &EntityId,
    role: ClanRole,
) -> Result<(), AppError> {
    sqlx::query("UPDATE clan_memberships SET role = ? WHERE user_id = ?")
        .bind(role)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn leader_of(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<EntityId>, AppError> {
    let leader = sqlx::query_scalar::<_, EntityId>(
        "SELECT user_id FROM clan_memberships WHERE clan_name = ? AND role = 'leader'",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(leader)
}

/// Promote the earliest-joined member if the clan has members but no leader
///
/// Returns the promoted user, if any. Idempotent: a clan that already has a
/// leader is left untouched.
pub async fn ensure_leader(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<Option<EntityId>, AppError> {
    if leader_of(conn, name).await?.is_some() {
        return Ok(None);
    }

    let earliest = sqlx::query_scalar::<_, EntityId>(
        r#"
        SELECT user_id FROM clan_memberships
        WHERE clan_name = ?
        ORDER BY joined_at ASC, rowid ASC
        LIMIT 1
        "#,
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(user_id) = &earliest {
        set_role(conn, user_id, ClanRole::Leader).await?;
    }
    Ok(earliest)
}

// =============================================================================
// Join requests
// =============================================================================

/// Enqueue a request; `Conflict` if one is already pending
pub async fn insert_join_request(
    conn: &mut SqliteConnection,
    request: &JoinRequest,
) -> Result<(), AppError> {
    let result = sqlx::query(
        "INSERT INTO clan_join_requests (id, clan_name, user_id, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&request.id)
    .bind(&request.clan_name)
    .bind(&request.user_id)
    .bind(request.created_at)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
            Err(AppError::conflict("join request already pending"))
        }
        Err(error) => Err(error.into()),
    }
}

pub async fn find_join_request(
    conn: &mut SqliteConnection,
    clan_name: &str,
    request_id: &EntityId,
) -> Result<Option<JoinRequest>, AppError> {
    let request = sqlx::query_as::<_, JoinRequest>(
        r#"
        SELECT id, clan_name, user_id, created_at FROM clan_join_requests
        WHERE id = ? AND clan_name = ?
        "#,
    )
    .bind(request_id)
    .bind(clan_name)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(request)
}

pub async fn delete_join_request(
    conn: &mut SqliteConnection,
    request_id: &EntityId,
) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM clan_join_requests WHERE id = ?")
        .bind(request_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Pending requests, oldest first
pub async fn join_requests(
    conn: &mut SqliteConnection,
    clan_name: &str,
) -> Result<Vec<JoinRequest>, AppError> {
    let rows = sqlx::query_as::<_, JoinRequest>(
        r#"
        SELECT id, clan_name, user_id, created_at FROM clan_join_requests
        WHERE clan_name = ?
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(clan_name)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

// =============================================================================
// Invites
// =============================================================================

/// Record an invite; `Conflict` if this user already has one for this clan
pub async fn insert_invite(
    conn: &mut SqliteConnection,
    invite: &ClanInvite,
) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        INSERT INTO clan_invites (id, user_id, clan_name, from_user_id, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&invite.id)
    .bind(&invite.user_id)
    .bind(&invite.clan_name)
    .bind(&invite.from_user_id)
    .bind(invite.created_at)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
            Err(AppError::conflict("already invited to this clan"))
        }
        Err(error) => Err(error.into()),
    }
}

pub async fn find_invite(
    conn: &mut SqliteConnection,
    user_id: &EntityId,
    invite_id: &EntityId,
) -> Result<Option<ClanInvite>, AppError> {
    let invite = sqlx::query_as::<_, ClanInvite>(
        r#"
        SELECT id, user_id, clan_name, from_user_id, created_at FROM clan_invites
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(invite_id)
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(invite)
}

pub async fn delete_invite(
    conn: &mut SqliteConnection,
    invite_id: &EntityId,
) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM clan_invites WHERE id = ?")
        .bind(invite_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Invites addressed to `user_id`, oldest first
pub async fn invites_for(
    conn: &mut SqliteConnection,
    user_id: &EntityId,
) -> Result<Vec<ClanInvite>, AppError> {
    let rows = sqlx::query_as::<_, ClanInvite>(
        r#"
        SELECT id, user_id, clan_name, from_user_id, created_at FROM clan_invites
        WHERE user_id = ?
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}
