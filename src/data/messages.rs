//! Conversations, messages and reactions

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::models::{Conversation, EntityId, FileMeta, Message, MessageType, Reaction};
use crate::error::AppError;

const CONVERSATION_COLUMNS: &str = "id, user_a, user_b, last_message_id, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, content, message_type, file_url, \
     file_name, file_size, file_mime, seen, edited_at, deleted_at, created_at";

/// Order an unordered pair the way the `conversations` table stores it
pub fn normalize_pair<'a>(a: &'a EntityId, b: &'a EntityId) -> (&'a EntityId, &'a EntityId) {
    if a <= b { (a, b) } else { (b, a) }
}

pub async fn find_conversation(
    conn: &mut SqliteConnection,
    id: &EntityId,
) -> Result<Option<Conversation>, AppError> {
    let conversation = sqlx::query_as::<_, Conversation>(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(conversation)
}

pub async fn require_conversation(
    conn: &mut SqliteConnection,
    id: &EntityId,
) -> Result<Conversation, AppError> {
    find_conversation(conn, id).await?.ok_or(AppError::NotFound)
}

/// Return the conversation for the unordered pair, creating it if needed
///
/// `INSERT OR IGNORE` against the pair's unique key makes concurrent calls
/// converge on one row.
pub async fn get_or_create_conversation(
    conn: &mut SqliteConnection,
    a: &EntityId,
    b: &EntityId,
) -> Result<Conversation, AppError> {
    let (user_a, user_b) = normalize_pair(a, b);
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO conversations
            (id, user_a, user_b, last_message_id, created_at, updated_at)
        VALUES (?, ?, ?, NULL, ?, ?)
        "#,
    )
    .bind(EntityId::new())
    .bind(user_a)
    .bind(user_b)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let conversation = sqlx::query_as::<_, Conversation>(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE user_a = ? AND user_b = ?"
    ))
    .bind(user_a)
    .bind(user_b)
    .fetch_one(&mut *conn)
    .await?;
    Ok(conversation)
}

/// Conversations of `user_id`, most recently active first
pub async fn conversations_for(
    conn: &mut SqliteConnection,
    user_id: &EntityId,
) -> Result<Vec<Conversation>, AppError> {
    let rows = sqlx::query_as::<_, Conversation>(&format!(
        r#"
        SELECT {CONVERSATION_COLUMNS} FROM conversations
        WHERE user_a = ? OR user_b = ?
        ORDER BY updated_at DESC, rowid DESC
        "#
    ))
    .bind(user_id)
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// Delete the conversation; its messages and reactions cascade
pub async fn delete_conversation(
    conn: &mut SqliteConnection,
    id: &EntityId,
) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM conversations WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Messages
// =============================================================================

/// Fields of a message being sent
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub id: &'a EntityId,
    pub conversation_id: &'a EntityId,
    pub sender_id: &'a EntityId,
    pub content: &'a str,
    pub message_type: MessageType,
    pub file: Option<&'a FileMeta>,
    pub created_at: DateTime<Utc>,
}

/// Insert the message and move the conversation's last-message pointer
pub async fn insert_message(
    conn: &mut SqliteConnection,
    message: &NewMessage<'_>,
) -> Result<(), AppError> {
    let empty = FileMeta::default();
    let file = message.file.unwrap_or(&empty);

    sqlx::query(
        r#"
        INSERT INTO messages (
            id, conversation_id, sender_id, content, message_type,
            file_url, file_name, file_size, file_mime, seen, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(message.id)
    .bind(message.conversation_id)
    .bind(message.sender_id)
    .bind(message.content)
    .bind(message.message_type)
    .bind(&file.url)
    .bind(&file.name)
    .bind(file.size)
    .bind(&file.mime)
    .bind(message.created_at)
    .execute(&mut *conn)
    .await?;

    sqlx::query("UPDATE conversations SET last_message_id = ?, updated_at = ? WHERE id = ?")
        .bind(message.id)
        .bind(message.created_at)
        .bind(message.conversation_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

pub async fn find_message(
    conn: &mut SqliteConnection,
    id: &EntityId,
) -> Result<Option<Message>, AppError> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?");
    let message = sqlx::query_as::<_, Message>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(message)
}

/// Messages of a conversation, oldest first
pub async fn messages_in(
    conn: &mut SqliteConnection,
    conversation_id: &EntityId,
) -> Result<Vec<Message>, AppError> {
    let rows = sqlx::query_as::<_, Message>(&format!(
        r#"
        SELECT {MESSAGE_COLUMNS} FROM messages
        WHERE conversation_id = ?
        ORDER BY created_at ASC, rowid ASC
        "#
    ))
    .bind(conversation_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

pub async fn edit_message(
    conn: &mut SqliteConnection,
    id: &EntityId,
    content: &str,
    edited_at: DateTime<Utc>,
) -> Result<(), AppError> {
    sqlx::query("UPDATE messages SET content = ?, edited_at = ? WHERE id = ?")
        .bind(content)
        .bind(edited_at)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Soft delete: clear content and file fields, keep the row
pub async fn soft_delete_message(
    conn: &mut SqliteConnection,
    id: &EntityId,
    deleted_at: DateTime<Utc>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE messages
        SET content = '', file_url = '', file_name = '', file_size = 0, file_mime = '',
            deleted_at = ?
        WHERE id = ?
        "#,
    )
    .bind(deleted_at)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Mark the listed messages of `conversation_id` as seen, skipping ones sent
/// by `reader_id`. Returns the ids that are now seen.
pub async fn mark_seen(
    conn: &mut SqliteConnection,
    conversation_id: &EntityId,
    reader_id: &EntityId,
    message_ids: &[EntityId],
) -> Result<Vec<EntityId>, AppError> {
    if message_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder =
        sqlx::QueryBuilder::new("UPDATE messages SET seen = 1 WHERE conversation_id = ");
    builder.push_bind(conversation_id);
    builder.push(" AND sender_id <> ");
    builder.push_bind(reader_id);
    builder.push(" AND id IN (");
    let mut separated = builder.separated(", ");
    for id in message_ids {
        separated.push_bind(id);
    }
    separated.push_unseparated(") RETURNING id");

    let ids = builder
        .build_query_scalar::<EntityId>()
        .fetch_all(&mut *conn)
        .await?;
    Ok(ids)
}

// =============================================================================
// Reactions
// =============================================================================

/// XOR toggle of `(user_id, emoji)` on a message; returns true if now present
pub async fn toggle_reaction(
    conn: &mut SqliteConnection,
    message_id: &EntityId,
    user_id: &EntityId,
    emoji: &str,
) -> Result<bool, AppError> {
    let removed = sqlx::query(
        "DELETE FROM message_reactions WHERE message_id = ? AND user_id = ? AND emoji = ?",
    )
    .bind(message_id)
    .bind(user_id)
    .bind(emoji)
    .execute(&mut *conn)
    .await?;
    if removed.rows_affected() > 0 {
        return Ok(false);
    }

    sqlx::query(
        r#"
        INSERT INTO message_reactions (message_id, user_id, emoji, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(message_id)
    .bind(user_id)
    .bind(emoji)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(true)
}

/// Current reactions on a message in the order they were added
pub async fn reactions(
    conn: &mut SqliteConnection,
    message_id: &EntityId,
) -> Result<Vec<Reaction>, AppError> {
    let rows = sqlx::query_as::<_, Reaction>(
        r#"
        SELECT emoji, user_id FROM message_reactions
        WHERE message_id = ?
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(message_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}
