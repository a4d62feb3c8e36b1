//! Notification fan-out
//!
//! A notification is recorded once per triggering event, inside the same
//! transaction as the event itself when the caller has one open, and is then
//! pushed to every live session of the recipient. Delivery is best effort;
//! the persisted record is what a client reads back later.

use chrono::Utc;
use sqlx::SqliteConnection;
use std::sync::Arc;

use crate::data::{
    Database, EntityId, Notification, NotificationKind, ProfileCache, notifications, posts,
};
use crate::error::AppError;
use crate::metrics::NOTIFICATIONS_CREATED;
use crate::realtime::{
    NotificationEnvelope, NotificationView, PostPreview, RealtimeEvent, SessionRegistry,
};

const PREVIEW_CHARS: usize = 80;
const LIST_LIMIT: usize = 50;

/// Insert a notification record unless it would notify the actor about
/// their own action
pub async fn record(
    conn: &mut SqliteConnection,
    recipient_id: &EntityId,
    from_id: &EntityId,
    kind: NotificationKind,
    post_id: Option<&EntityId>,
) -> Result<Option<Notification>, AppError> {
    if recipient_id == from_id {
        return Ok(None);
    }

    let notification = Notification {
        id: EntityId::new(),
        user_id: recipient_id.clone(),
        from_id: from_id.clone(),
        kind,
        post_id: post_id.cloned(),
        read: false,
        created_at: Utc::now(),
    };
    notifications::insert(conn, &notification).await?;
    NOTIFICATIONS_CREATED.with_label_values(&[kind.as_str()]).inc();
    Ok(Some(notification))
}

/// Notification service
pub struct NotificationService {
    db: Arc<Database>,
    profile_cache: Arc<ProfileCache>,
    registry: Arc<SessionRegistry>,
}

impl NotificationService {
    pub fn new(
        db: Arc<Database>,
        profile_cache: Arc<ProfileCache>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            db,
            profile_cache,
            registry,
        }
    }

    /// Push an already-recorded notification to the recipient's sessions
    pub async fn dispatch(
        &self,
        notification: &Notification,
    ) -> Result<NotificationView, AppError> {
        let view = self.present(notification).await?;
        self.registry
            .emit_to_user(
                &notification.user_id,
                RealtimeEvent::NotificationNew(NotificationEnvelope {
                    notification: view.clone(),
                }),
            )
            .await;
        Ok(view)
    }

    /// Dispatch whatever `record` produced; delivery errors are logged, not
    /// returned, because the triggering mutation has already committed
    pub async fn dispatch_all(&self, recorded: impl IntoIterator<Item = Option<Notification>>) {
        for notification in recorded.into_iter().flatten() {
            if let Err(error) = self.dispatch(&notification).await {
                tracing::warn!(
                    %error,
                    notification_id = %notification.id,
                    "Failed to deliver notification"
                );
            }
        }
    }

    /// Newest first, capped
    pub async fn list(&self, user_id: &EntityId) -> Result<Vec<NotificationView>, AppError> {
        let rows = {
            let mut conn = self.db.acquire().await?;
            notifications::for_user(&mut conn, user_id, LIST_LIMIT).await?
        };

        let mut views = Vec::with_capacity(rows.len());
        for notification in &rows {
            views.push(self.present(notification).await?);
        }
        Ok(views)
    }

    pub async fn mark_all_read(&self, user_id: &EntityId) -> Result<u64, AppError> {
        let mut conn = self.db.acquire().await?;
        let changed = notifications::mark_all_read(&mut conn, user_id).await?;
        tracing::debug!(user_id = %user_id, changed, "Notifications marked read");
        Ok(changed)
    }

    pub async fn unread_count(&self, user_id: &EntityId) -> Result<i64, AppError> {
        let mut conn = self.db.acquire().await?;
        notifications::unread_count(&mut conn, user_id).await
    }

    async fn present(&self, notification: &Notification) -> Result<NotificationView, AppError> {
        let from = self
            .profile_cache
            .require(&self.db, &notification.from_id)
            .await?;

        let post = match &notification.post_id {
            Some(post_id) => {
                let mut conn = self.db.acquire().await?;
                posts::find(&mut conn, post_id).await?.map(|post| PostPreview {
                    id: post.id,
                    content: post.content.chars().take(PREVIEW_CHARS).collect(),
                    media_url: post.media_url,
                })
            }
            None => None,
        };

        Ok(NotificationView::new(notification, (*from).clone(), post))
    }
}
