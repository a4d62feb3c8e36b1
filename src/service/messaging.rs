//! Direct messaging
//!
//! A conversation belongs to exactly two users. Block state is re-checked on
//! every send, listing and room join, since it may change after the
//! conversation exists. Room broadcasts happen after commit; the message
//! notification follows the broadcast.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use std::sync::Arc;

use super::notification::{self, NotificationService};
use crate::data::{
    Conversation, Database, EntityId, FileMeta, Message, MessageType, Notification,
    NotificationKind, ProfileCache, UserSummary, graph, messages, users,
};
use crate::error::AppError;
use crate::realtime::{
    MessageDeleted, MessageView, ReactionsChanged, RealtimeEvent, SeenReceipt, SessionRegistry,
    conversation_room,
};

const MAX_EMOJI_CHARS: usize = 16;

/// A conversation from one participant's side
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: EntityId,
    pub participant: UserSummary,
    pub online: bool,
    pub last_message: Option<MessageView>,
    pub updated_at: DateTime<Utc>,
}

/// Content of a message being sent
#[derive(Debug, Clone, Default)]
pub struct MessageDraft {
    pub content: String,
    /// Reference returned by the media store
    pub file: Option<FileMeta>,
}

impl MessageDraft {
    /// Resolve type and content; a file-only message takes its name as
    /// content
    fn resolve(self) -> Result<(MessageType, String, Option<FileMeta>), AppError> {
        let content = self.content.trim().to_string();
        match self.file {
            Some(file) if !file.url.trim().is_empty() => {
                let message_type = if file.mime.starts_with("image/") {
                    MessageType::Image
                } else {
                    MessageType::File
                };
                let content = if content.is_empty() { file.name.clone() } else { content };
                Ok((message_type, content, Some(file)))
            }
            _ if content.is_empty() => Err(AppError::validation("message needs content or a file")),
            _ => Ok((MessageType::Text, content, None)),
        }
    }
}

/// Load the conversation and check that `user_id` takes part in it
async fn participant_of(
    conn: &mut SqliteConnection,
    conversation_id: &EntityId,
    user_id: &EntityId,
) -> Result<Conversation, AppError> {
    let conversation = messages::require_conversation(conn, conversation_id).await?;
    if !conversation.has_participant(user_id) {
        return Err(AppError::forbidden("not a participant"));
    }
    Ok(conversation)
}

async fn ensure_not_blocked(
    conn: &mut SqliteConnection,
    a: &EntityId,
    b: &EntityId,
) -> Result<(), AppError> {
    if graph::is_blocked_either(conn, a, b).await? {
        return Err(AppError::forbidden("blocked"));
    }
    Ok(())
}

/// Messaging service
pub struct MessagingService {
    db: Arc<Database>,
    profile_cache: Arc<ProfileCache>,
    registry: Arc<SessionRegistry>,
    notifications: Arc<NotificationService>,
}

impl MessagingService {
    pub fn new(
        db: Arc<Database>,
        profile_cache: Arc<ProfileCache>,
        registry: Arc<SessionRegistry>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            db,
            profile_cache,
            registry,
            notifications,
        }
    }

    /// The conversation between the actor and `other_id`, created on first
    /// use
    pub async fn get_or_create(
        &self,
        actor_id: &EntityId,
        other_id: &EntityId,
    ) -> Result<ConversationView, AppError> {
        if actor_id == other_id {
            return Err(AppError::validation("cannot message yourself"));
        }

        let conversation = {
            let mut conn = self.db.acquire().await?;
            if !users::exists(&mut conn, other_id).await? {
                return Err(AppError::NotFound);
            }
            ensure_not_blocked(&mut conn, actor_id, other_id).await?;
            messages::get_or_create_conversation(&mut conn, actor_id, other_id).await?
        };

        self.present_conversation(actor_id, conversation).await
    }

    /// The actor's conversations, most recent first, minus those with a
    /// block in either direction
    pub async fn conversations(
        &self,
        actor_id: &EntityId,
    ) -> Result<Vec<ConversationView>, AppError> {
        let visible = {
            let mut conn = self.db.acquire().await?;
            let all = messages::conversations_for(&mut conn, actor_id).await?;
            let mut visible = Vec::with_capacity(all.len());
            for conversation in all {
                let other = conversation.other_participant(actor_id);
                if !graph::is_blocked_either(&mut conn, actor_id, other).await? {
                    visible.push(conversation);
                }
            }
            visible
        };

        let mut views = Vec::with_capacity(visible.len());
        for conversation in visible {
            views.push(self.present_conversation(actor_id, conversation).await?);
        }
        Ok(views)
    }

    pub async fn conversation(
        &self,
        actor_id: &EntityId,
        conversation_id: &EntityId,
    ) -> Result<ConversationView, AppError> {
        let conversation = {
            let mut conn = self.db.acquire().await?;
            participant_of(&mut conn, conversation_id, actor_id).await?
        };
        self.present_conversation(actor_id, conversation).await
    }

    /// Delete the conversation and its messages
    pub async fn delete_conversation(
        &self,
        actor_id: &EntityId,
        conversation_id: &EntityId,
    ) -> Result<(), AppError> {
        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<(), AppError> = async {
            participant_of(&mut *conn, conversation_id, actor_id).await?;
            messages::delete_conversation(&mut *conn, conversation_id).await?;
            Ok(())
        }
        .await;
        tx.finish(result).await?;

        tracing::info!(
            conversation_id = %conversation_id,
            actor_id = %actor_id,
            "Conversation deleted"
        );
        Ok(())
    }

    /// Messages oldest first
    pub async fn messages(
        &self,
        actor_id: &EntityId,
        conversation_id: &EntityId,
    ) -> Result<Vec<MessageView>, AppError> {
        let rows = {
            let mut conn = self.db.acquire().await?;
            let conversation = participant_of(&mut conn, conversation_id, actor_id).await?;
            let other = conversation.other_participant(actor_id);
            ensure_not_blocked(&mut conn, actor_id, other).await?;
            messages::messages_in(&mut conn, conversation_id).await?
        };

        let mut views = Vec::with_capacity(rows.len());
        for message in &rows {
            views.push(self.present_message(message).await?);
        }
        Ok(views)
    }

    /// Persist a message, broadcast it to the conversation room, then notify
    /// the other participant
    pub async fn send(
        &self,
        sender_id: &EntityId,
        conversation_id: &EntityId,
        draft: MessageDraft,
    ) -> Result<MessageView, AppError> {
        let (message_type, content, file) = draft.resolve()?;
        let id = EntityId::new();

        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<(Message, Option<Notification>), AppError> = async {
            let conversation = participant_of(&mut *conn, conversation_id, sender_id).await?;
            let recipient_id = conversation.other_participant(sender_id).clone();
            ensure_not_blocked(&mut *conn, sender_id, &recipient_id).await?;

            messages::insert_message(
                &mut *conn,
                &messages::NewMessage {
                    id: &id,
                    conversation_id,
                    sender_id,
                    content: &content,
                    message_type,
                    file: file.as_ref(),
                    created_at: Utc::now(),
                },
            )
            .await?;
            let message = messages::find_message(&mut *conn, &id)
                .await?
                .ok_or(AppError::NotFound)?;
            let recorded = notification::record(
                &mut *conn,
                &recipient_id,
                sender_id,
                NotificationKind::Message,
                None,
            )
            .await?;
            Ok((message, recorded))
        }
        .await;
        let (message, recorded) = tx.finish(result).await?;

        tracing::debug!(message_id = %id, conversation_id = %conversation_id, "Message sent");
        let view = self.present_message(&message).await?;
        self.registry
            .emit_to_room(
                &conversation_room(conversation_id),
                RealtimeEvent::MessageNew(view.clone()),
                None,
            )
            .await;
        self.notifications.dispatch_all([recorded]).await;
        Ok(view)
    }

    /// Replace the content of the actor's own message
    ///
    /// # Errors
    /// `NotFound` unless the message exists, was sent by the actor and has
    /// not been deleted.
    pub async fn edit(
        &self,
        actor_id: &EntityId,
        message_id: &EntityId,
        content: &str,
    ) -> Result<MessageView, AppError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::validation("content required"));
        }

        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<Message, AppError> = async {
            let message = self.own_message(&mut *conn, actor_id, message_id).await?;
            messages::edit_message(&mut *conn, &message.id, content, Utc::now()).await?;
            messages::find_message(&mut *conn, &message.id)
                .await?
                .ok_or(AppError::NotFound)
        }
        .await;
        let message = tx.finish(result).await?;

        let view = self.present_message(&message).await?;
        self.registry
            .emit_to_room(
                &conversation_room(&message.conversation_id),
                RealtimeEvent::MessageEdit(view.clone()),
                None,
            )
            .await;
        Ok(view)
    }

    /// Soft-delete the actor's own message
    pub async fn delete(&self, actor_id: &EntityId, message_id: &EntityId) -> Result<(), AppError> {
        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<Message, AppError> = async {
            let message = self.own_message(&mut *conn, actor_id, message_id).await?;
            messages::soft_delete_message(&mut *conn, &message.id, Utc::now()).await?;
            Ok(message)
        }
        .await;
        let message = tx.finish(result).await?;

        self.registry
            .emit_to_room(
                &conversation_room(&message.conversation_id),
                RealtimeEvent::MessageDelete(MessageDeleted {
                    id: message.id,
                    conversation_id: message.conversation_id.clone(),
                }),
                None,
            )
            .await;
        Ok(())
    }

    /// Toggle the actor's `emoji` on a message and broadcast the full list
    pub async fn react(
        &self,
        actor_id: &EntityId,
        message_id: &EntityId,
        emoji: &str,
    ) -> Result<ReactionsChanged, AppError> {
        let emoji = emoji.trim();
        if emoji.is_empty() || emoji.chars().count() > MAX_EMOJI_CHARS {
            return Err(AppError::validation("invalid emoji"));
        }

        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<ReactionsChanged, AppError> = async {
            let message = messages::find_message(&mut *conn, message_id)
                .await?
                .ok_or(AppError::NotFound)?;
            participant_of(&mut *conn, &message.conversation_id, actor_id).await?;
            messages::toggle_reaction(&mut *conn, message_id, actor_id, emoji).await?;
            Ok(ReactionsChanged {
                id: message.id,
                reactions: messages::reactions(&mut *conn, message_id).await?,
                conversation_id: message.conversation_id,
            })
        }
        .await;
        let changed = tx.finish(result).await?;

        self.registry
            .emit_to_room(
                &conversation_room(&changed.conversation_id),
                RealtimeEvent::MessageReaction(changed.clone()),
                None,
            )
            .await;
        Ok(changed)
    }

    /// Mark messages the reader received as seen and tell the whole room,
    /// the acknowledging session included
    pub async fn mark_seen(
        &self,
        reader_id: &EntityId,
        conversation_id: &EntityId,
        message_ids: &[EntityId],
    ) -> Result<Vec<EntityId>, AppError> {
        let seen = {
            let mut conn = self.db.acquire().await?;
            let conversation = participant_of(&mut conn, conversation_id, reader_id).await?;
            ensure_not_blocked(&mut conn, reader_id, conversation.other_participant(reader_id))
                .await?;
            messages::mark_seen(&mut conn, conversation_id, reader_id, message_ids).await?
        };

        if !seen.is_empty() {
            self.registry
                .emit_to_room(
                    &conversation_room(conversation_id),
                    RealtimeEvent::MessageSeen(SeenReceipt {
                        message_ids: seen.clone(),
                        conversation_id: conversation_id.clone(),
                        user_id: reader_id.clone(),
                    }),
                    None,
                )
                .await;
        }
        Ok(seen)
    }

    /// Check that `user_id` may join the conversation's live room
    pub async fn authorize_room_join(
        &self,
        user_id: &EntityId,
        conversation_id: &EntityId,
    ) -> Result<(), AppError> {
        let mut conn = self.db.acquire().await?;
        let conversation = participant_of(&mut conn, conversation_id, user_id).await?;
        ensure_not_blocked(&mut conn, user_id, conversation.other_participant(user_id)).await
    }

    async fn own_message(
        &self,
        conn: &mut SqliteConnection,
        actor_id: &EntityId,
        message_id: &EntityId,
    ) -> Result<Message, AppError> {
        match messages::find_message(conn, message_id).await? {
            Some(message) if &message.sender_id == actor_id && message.deleted_at.is_none() => {
                Ok(message)
            }
            _ => Err(AppError::NotFound),
        }
    }

    async fn present_message(&self, message: &Message) -> Result<MessageView, AppError> {
        let sender = self.profile_cache.require(&self.db, &message.sender_id).await?;
        let reactions = {
            let mut conn = self.db.acquire().await?;
            messages::reactions(&mut conn, &message.id).await?
        };
        Ok(MessageView::new(message, (*sender).clone(), reactions))
    }

    async fn present_conversation(
        &self,
        viewer_id: &EntityId,
        conversation: Conversation,
    ) -> Result<ConversationView, AppError> {
        let other_id = conversation.other_participant(viewer_id).clone();
        let participant = self.profile_cache.require(&self.db, &other_id).await?;

        let last = match &conversation.last_message_id {
            Some(id) => {
                let mut conn = self.db.acquire().await?;
                messages::find_message(&mut conn, id).await?
            }
            None => None,
        };
        let last_message = match last {
            Some(message) => Some(self.present_message(&message).await?),
            None => None,
        };

        Ok(ConversationView {
            id: conversation.id,
            participant: (*participant).clone(),
            online: self.registry.is_online(&other_id).await,
            last_message,
            updated_at: conversation.updated_at,
        })
    }
}
