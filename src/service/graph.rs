//! Social graph operations
//!
//! Follow, follow requests, blocks and mutes. Each read-modify-write runs in
//! one immediate transaction; notifications are recorded inside it and
//! delivered after commit.

use serde::Serialize;
use std::sync::Arc;

use super::notification::{self, NotificationService};
use crate::data::{
    Database, EntityId, Notification, NotificationKind, UserSummary, graph, users,
};
use crate::error::AppError;

/// Result of a follow attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowOutcome {
    /// A follow request is pending approval
    pub requested: bool,
    /// The follow edge exists
    pub following: bool,
}

/// Graph service
pub struct GraphService {
    db: Arc<Database>,
    notifications: Arc<NotificationService>,
}

impl GraphService {
    pub fn new(db: Arc<Database>, notifications: Arc<NotificationService>) -> Self {
        Self { db, notifications }
    }

    /// Follow `target_id`, or request to if their profile is private
    ///
    /// Following an existing edge or re-requesting a pending request changes
    /// nothing and notifies nobody.
    pub async fn follow(
        &self,
        actor_id: &EntityId,
        target_id: &EntityId,
    ) -> Result<FollowOutcome, AppError> {
        if actor_id == target_id {
            return Err(AppError::conflict("cannot follow yourself"));
        }

        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<(FollowOutcome, Option<Notification>), AppError> = async {
            let target = users::require(&mut *conn, target_id).await?;
            if graph::is_blocked_either(&mut *conn, actor_id, target_id).await? {
                return Err(AppError::forbidden("blocked"));
            }

            if graph::has_edge(&mut *conn, graph::Edge::Follow, actor_id, target_id).await? {
                return Ok((FollowOutcome { requested: false, following: true }, None));
            }

            if target.is_private {
                let inserted =
                    graph::insert_edge(&mut *conn, graph::Edge::FollowRequest, actor_id, target_id)
                        .await?;
                let recorded = if inserted {
                    notification::record(
                        &mut *conn,
                        target_id,
                        actor_id,
                        NotificationKind::FollowRequest,
                        None,
                    )
                    .await?
                } else {
                    None
                };
                return Ok((FollowOutcome { requested: true, following: false }, recorded));
            }

            graph::insert_edge(&mut *conn, graph::Edge::Follow, actor_id, target_id).await?;
            let recorded = notification::record(
                &mut *conn,
                target_id,
                actor_id,
                NotificationKind::Follow,
                None,
            )
            .await?;
            Ok((FollowOutcome { requested: false, following: true }, recorded))
        }
        .await;
        let (outcome, recorded) = tx.finish(result).await?;

        tracing::info!(
            actor_id = %actor_id,
            target_id = %target_id,
            requested = outcome.requested,
            "Follow processed"
        );
        self.notifications.dispatch_all([recorded]).await;
        Ok(outcome)
    }

    /// Remove the follow edge and any pending request; returns whether
    /// anything changed
    pub async fn unfollow(
        &self,
        actor_id: &EntityId,
        target_id: &EntityId,
    ) -> Result<bool, AppError> {
        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<bool, AppError> = async {
            let followed =
                graph::delete_edge(&mut *conn, graph::Edge::Follow, actor_id, target_id).await?;
            let requested =
                graph::delete_edge(&mut *conn, graph::Edge::FollowRequest, actor_id, target_id)
                    .await?;
            Ok(followed || requested)
        }
        .await;
        tx.finish(result).await
    }

    /// Accept a pending request from `requester_id`
    ///
    /// # Errors
    /// `NotFound` if there is no such pending request.
    pub async fn approve(
        &self,
        actor_id: &EntityId,
        requester_id: &EntityId,
    ) -> Result<(), AppError> {
        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<Option<Notification>, AppError> = async {
            let removed =
                graph::delete_edge(&mut *conn, graph::Edge::FollowRequest, requester_id, actor_id)
                    .await?;
            if !removed {
                return Err(AppError::NotFound);
            }
            graph::insert_edge(&mut *conn, graph::Edge::Follow, requester_id, actor_id).await?;
            notification::record(
                &mut *conn,
                requester_id,
                actor_id,
                NotificationKind::FollowApproved,
                None,
            )
            .await
        }
        .await;
        let recorded = tx.finish(result).await?;

        tracing::info!(
            actor_id = %actor_id,
            requester_id = %requester_id,
            "Follow request approved"
        );
        self.notifications.dispatch_all([recorded]).await;
        Ok(())
    }

    /// Drop a pending request; a missing request is a successful no-op
    pub async fn deny(
        &self,
        actor_id: &EntityId,
        requester_id: &EntityId,
    ) -> Result<bool, AppError> {
        let mut conn = self.db.acquire().await?;
        graph::delete_edge(&mut conn, graph::Edge::FollowRequest, requester_id, actor_id).await
    }

    pub async fn pending_requests(
        &self,
        actor_id: &EntityId,
    ) -> Result<Vec<UserSummary>, AppError> {
        let mut conn = self.db.acquire().await?;
        graph::pending_requests(&mut conn, actor_id).await
    }

    /// Block `target_id` and sever every follow edge and request between the
    /// two users
    pub async fn block(&self, actor_id: &EntityId, target_id: &EntityId) -> Result<(), AppError> {
        if actor_id == target_id {
            return Err(AppError::validation("cannot block yourself"));
        }

        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<(), AppError> = async {
            if !users::exists(&mut *conn, target_id).await? {
                return Err(AppError::NotFound);
            }
            graph::insert_edge(&mut *conn, graph::Edge::Block, actor_id, target_id).await?;
            graph::sever(&mut *conn, actor_id, target_id).await
        }
        .await;
        tx.finish(result).await?;

        tracing::info!(actor_id = %actor_id, target_id = %target_id, "User blocked");
        Ok(())
    }

    pub async fn unblock(
        &self,
        actor_id: &EntityId,
        target_id: &EntityId,
    ) -> Result<bool, AppError> {
        let mut conn = self.db.acquire().await?;
        graph::delete_edge(&mut conn, graph::Edge::Block, actor_id, target_id).await
    }

    pub async fn mute(&self, actor_id: &EntityId, target_id: &EntityId) -> Result<(), AppError> {
        if actor_id == target_id {
            return Err(AppError::validation("cannot mute yourself"));
        }

        let mut conn = self.db.acquire().await?;
        if !users::exists(&mut conn, target_id).await? {
            return Err(AppError::NotFound);
        }
        graph::insert_edge(&mut conn, graph::Edge::Mute, actor_id, target_id).await?;
        Ok(())
    }

    pub async fn unmute(
        &self,
        actor_id: &EntityId,
        target_id: &EntityId,
    ) -> Result<bool, AppError> {
        let mut conn = self.db.acquire().await?;
        graph::delete_edge(&mut conn, graph::Edge::Mute, actor_id, target_id).await
    }
}
