//! Realtime event taxonomy
//!
//! Every frame on the wire is `{"event": <name>, "data": <payload>}` with
//! camelCase payload fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{
    EntityId, FileMeta, Message, MessageType, Notification, NotificationKind, PresenceStatus,
    Reaction, UserSummary,
};

/// Events pushed from the server to live sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum RealtimeEvent {
    #[serde(rename = "message:new")]
    MessageNew(MessageView),
    #[serde(rename = "message:edit")]
    MessageEdit(MessageView),
    #[serde(rename = "message:delete")]
    MessageDelete(MessageDeleted),
    #[serde(rename = "message:reaction")]
    MessageReaction(ReactionsChanged),
    #[serde(rename = "message:seen")]
    MessageSeen(SeenReceipt),
    #[serde(rename = "typing")]
    Typing(TypingIndicator),
    #[serde(rename = "notification:new")]
    NotificationNew(NotificationEnvelope),
    #[serde(rename = "presence:update")]
    PresenceUpdate(PresenceUpdate),
}

impl RealtimeEvent {
    /// Wire name, also used as the metrics label
    pub fn name(&self) -> &'static str {
        match self {
            RealtimeEvent::MessageNew(_) => "message:new",
            RealtimeEvent::MessageEdit(_) => "message:edit",
            RealtimeEvent::MessageDelete(_) => "message:delete",
            RealtimeEvent::MessageReaction(_) => "message:reaction",
            RealtimeEvent::MessageSeen(_) => "message:seen",
            RealtimeEvent::Typing(_) => "typing",
            RealtimeEvent::NotificationNew(_) => "notification:new",
            RealtimeEvent::PresenceUpdate(_) => "presence:update",
        }
    }
}

/// A message as clients render it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: EntityId,
    pub conversation_id: EntityId,
    pub sender: UserSummary,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub file: Option<FileMeta>,
    pub reactions: Vec<Reaction>,
    pub seen: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MessageView {
    pub fn new(message: &Message, sender: UserSummary, reactions: Vec<Reaction>) -> Self {
        Self {
            id: message.id.clone(),
            conversation_id: message.conversation_id.clone(),
            sender,
            content: message.content.clone(),
            message_type: message.message_type,
            file: message.file_meta(),
            reactions,
            seen: message.seen,
            edited_at: message.edited_at,
            deleted_at: message.deleted_at,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeleted {
    pub id: EntityId,
    pub conversation_id: EntityId,
}

/// Full reaction list after a toggle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionsChanged {
    pub id: EntityId,
    pub conversation_id: EntityId,
    pub reactions: Vec<Reaction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeenReceipt {
    pub message_ids: Vec<EntityId>,
    pub conversation_id: EntityId,
    pub user_id: EntityId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub conversation_id: EntityId,
    pub user_id: EntityId,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEnvelope {
    pub notification: NotificationView,
}

/// Short preview of the post a notification refers to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPreview {
    pub id: EntityId,
    pub content: String,
    pub media_url: String,
}

/// A notification as clients render it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub from: UserSummary,
    pub post: Option<PostPreview>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl NotificationView {
    pub fn new(notification: &Notification, from: UserSummary, post: Option<PostPreview>) -> Self {
        Self {
            id: notification.id.clone(),
            kind: notification.kind,
            from,
            post,
            read: notification.read,
            created_at: notification.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub user_id: EntityId,
    pub status: PresenceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Frames accepted from clients
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "conversation:join", rename_all = "camelCase")]
    JoinConversation { conversation_id: EntityId },
    #[serde(rename = "conversation:leave", rename_all = "camelCase")]
    LeaveConversation { conversation_id: EntityId },
    #[serde(rename = "typing", rename_all = "camelCase")]
    Typing {
        conversation_id: EntityId,
        is_typing: bool,
    },
    #[serde(rename = "message:seen", rename_all = "camelCase")]
    Seen {
        message_ids: Vec<EntityId>,
        conversation_id: EntityId,
    },
}
