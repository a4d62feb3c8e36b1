//! Clan governance
//!
//! Per-member roles are `member`, `officer` and `leader`; a user without a
//! membership row is unaffiliated. Every mutating transition re-reads the
//! actor's role inside its own immediate transaction, then settles the clan:
//! an empty clan is dissolved and a leaderless one gets its earliest member
//! promoted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use std::sync::Arc;

use crate::data::{
    Clan, ClanInvite, ClanRole, Database, EntityId, JoinRequest, Membership, UserSummary, clans,
    users,
};
use crate::error::AppError;

pub const MAX_NAME_CHARS: usize = 40;
pub const MAX_MOTTO_CHARS: usize = 120;
pub const MAX_ANNOUNCEMENT_CHARS: usize = 500;
/// Member count at which a clan becomes a constellation
pub const CONSTELLATION_SIZE: i64 = 5;

/// Parse a role that may be granted through a role change
pub fn parse_assignable_role(role: &str) -> Result<ClanRole, AppError> {
    match role {
        "officer" => Ok(ClanRole::Officer),
        "member" => Ok(ClanRole::Member),
        _ => Err(AppError::validation(format!("invalid role: {}", role))),
    }
}

fn capped(text: &str, max_chars: usize) -> String {
    text.trim().chars().take(max_chars).collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    #[serde(flatten)]
    pub user: UserSummary,
    pub role: ClanRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequestView {
    pub id: EntityId,
    pub user: UserSummary,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteView {
    pub id: EntityId,
    pub clan_name: String,
    pub from: UserSummary,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClanView {
    pub name: String,
    pub motto: String,
    pub announcement: String,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub members: Vec<MemberView>,
    pub count: i64,
    pub is_constellation: bool,
    pub needed: i64,
    pub leader: Option<UserSummary>,
    pub is_leader: bool,
    pub viewer_role: Option<ClanRole>,
    /// Pending requests; only present for the leader and officers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_requests: Option<Vec<JoinRequestView>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinOutcome {
    pub joined: bool,
    pub requested: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ClanSettings {
    pub motto: String,
    pub announcement: String,
    /// `None` keeps the current setting
    pub is_private: Option<bool>,
}

/// The actor's role in `clan_name`, or `None` if they belong elsewhere or
/// nowhere
async fn role_in(
    conn: &mut SqliteConnection,
    actor_id: &EntityId,
    clan_name: &str,
) -> Result<Option<ClanRole>, AppError> {
    Ok(clans::membership_of(conn, actor_id)
        .await?
        .filter(|m| m.clan_name.eq_ignore_ascii_case(clan_name))
        .map(|m| m.role))
}

async fn require_leader(
    conn: &mut SqliteConnection,
    actor_id: &EntityId,
    clan_name: &str,
) -> Result<(), AppError> {
    match role_in(conn, actor_id, clan_name).await? {
        Some(ClanRole::Leader) => Ok(()),
        _ => Err(AppError::forbidden("only the clan leader may do this")),
    }
}

async fn require_moderator(
    conn: &mut SqliteConnection,
    actor_id: &EntityId,
    clan_name: &str,
) -> Result<ClanRole, AppError> {
    match role_in(conn, actor_id, clan_name).await? {
        Some(role) if role.can_moderate() => Ok(role),
        _ => Err(AppError::forbidden("only the leader or an officer may do this")),
    }
}

/// Dissolve an empty clan, otherwise make sure it has a leader
async fn settle(conn: &mut SqliteConnection, clan_name: &str) -> Result<(), AppError> {
    if clans::member_count(conn, clan_name).await? == 0 {
        clans::delete(conn, clan_name).await?;
        tracing::info!(clan = %clan_name, "Clan dissolved");
        return Ok(());
    }
    if let Some(promoted) = clans::ensure_leader(conn, clan_name).await? {
        tracing::info!(clan = %clan_name, user_id = %promoted, "Leader backfilled");
    }
    Ok(())
}

/// Clan service
pub struct ClanService {
    db: Arc<Database>,
}

impl ClanService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Found a clan with the actor as its leader
    ///
    /// # Errors
    /// `Validation` for an empty or overlong name, `Conflict` if the name is
    /// taken or the actor already belongs to a clan.
    pub async fn create(
        &self,
        actor_id: &EntityId,
        name: &str,
        is_private: bool,
    ) -> Result<ClanView, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("clan name required"));
        }
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(AppError::validation("clan name too long"));
        }

        let now = Utc::now();
        let clan = Clan {
            name: name.to_string(),
            motto: String::new(),
            announcement: String::new(),
            is_private,
            created_at: now,
        };

        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<(), AppError> = async {
            if clans::membership_of(&mut *conn, actor_id).await?.is_some() {
                return Err(AppError::conflict("already in a clan"));
            }
            clans::insert(&mut *conn, &clan).await?;
            clans::insert_membership(&mut *conn, actor_id, name, ClanRole::Leader, now).await
        }
        .await;
        tx.finish(result).await?;

        tracing::info!(clan = %name, leader_id = %actor_id, "Clan created");
        self.view(actor_id, name).await
    }

    /// Read-only view of a clan
    pub async fn view(&self, viewer_id: &EntityId, name: &str) -> Result<ClanView, AppError> {
        let mut conn = self.db.acquire().await?;
        let clan = clans::require(&mut conn, name.trim()).await?;
        let memberships = clans::members(&mut conn, &clan.name).await?;

        let ids: Vec<EntityId> = memberships.iter().map(|m| m.user_id.clone()).collect();
        let mut summaries: HashMap<EntityId, UserSummary> = users::summaries(&mut conn, &ids)
            .await?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();

        let viewer_role = memberships
            .iter()
            .find(|m| &m.user_id == viewer_id)
            .map(|m| m.role);
        let leader_id = memberships
            .iter()
            .find(|m| m.role == ClanRole::Leader)
            .map(|m| m.user_id.clone());

        let join_requests = match viewer_role {
            Some(role) if role.can_moderate() => {
                let pending = clans::join_requests(&mut conn, &clan.name).await?;
                Some(self.present_requests(&mut conn, pending).await?)
            }
            _ => None,
        };

        let members: Vec<MemberView> = memberships
            .into_iter()
            .filter_map(|Membership { user_id, role, joined_at, .. }| {
                summaries.remove(&user_id).map(|user| MemberView {
                    user,
                    role,
                    joined_at,
                })
            })
            .collect();
        let count = members.len() as i64;
        let leader = leader_id.as_ref().and_then(|id| {
            members
                .iter()
                .find(|m| &m.user.id == id)
                .map(|m| m.user.clone())
        });

        Ok(ClanView {
            name: clan.name,
            motto: clan.motto,
            announcement: clan.announcement,
            is_private: clan.is_private,
            created_at: clan.created_at,
            members,
            count,
            is_constellation: count >= CONSTELLATION_SIZE,
            needed: (CONSTELLATION_SIZE - count).max(0),
            leader,
            is_leader: viewer_role == Some(ClanRole::Leader),
            viewer_role,
            join_requests,
        })
    }

    /// Join a public clan, or ask to join a private one
    pub async fn join(&self, actor_id: &EntityId, name: &str) -> Result<JoinOutcome, AppError> {
        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<JoinOutcome, AppError> = async {
            if clans::membership_of(&mut *conn, actor_id).await?.is_some() {
                return Err(AppError::conflict("already in a clan"));
            }
            let clan = clans::require(&mut *conn, name.trim()).await?;

            if clan.is_private {
                clans::insert_join_request(
                    &mut *conn,
                    &JoinRequest {
                        id: EntityId::new(),
                        clan_name: clan.name.clone(),
                        user_id: actor_id.clone(),
                        created_at: Utc::now(),
                    },
                )
                .await?;
                return Ok(JoinOutcome { joined: false, requested: true });
            }

            clans::insert_membership(&mut *conn, actor_id, &clan.name, ClanRole::Member, Utc::now())
                .await?;
            settle(&mut *conn, &clan.name).await?;
            Ok(JoinOutcome { joined: true, requested: false })
        }
        .await;
        let outcome = tx.finish(result).await?;

        tracing::info!(
            clan = %name,
            user_id = %actor_id,
            joined = outcome.joined,
            "Clan join processed"
        );
        Ok(outcome)
    }

    pub async fn join_requests(
        &self,
        actor_id: &EntityId,
        name: &str,
    ) -> Result<Vec<JoinRequestView>, AppError> {
        let mut conn = self.db.acquire().await?;
        let clan = clans::require(&mut conn, name.trim()).await?;
        require_moderator(&mut conn, actor_id, &clan.name).await?;
        let pending = clans::join_requests(&mut conn, &clan.name).await?;
        self.present_requests(&mut conn, pending).await
    }

    /// Consume a join request and admit the requester
    ///
    /// Returns `false` if the requester joined another clan in the meantime;
    /// the request is consumed either way.
    pub async fn approve_request(
        &self,
        actor_id: &EntityId,
        name: &str,
        request_id: &EntityId,
    ) -> Result<bool, AppError> {
        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<bool, AppError> = async {
            let clan = clans::require(&mut *conn, name.trim()).await?;
            require_moderator(&mut *conn, actor_id, &clan.name).await?;
            let request = clans::find_join_request(&mut *conn, &clan.name, request_id)
                .await?
                .ok_or(AppError::NotFound)?;
            clans::delete_join_request(&mut *conn, &request.id).await?;

            if clans::membership_of(&mut *conn, &request.user_id).await?.is_some() {
                return Ok(false);
            }
            clans::insert_membership(
                &mut *conn,
                &request.user_id,
                &clan.name,
                ClanRole::Member,
                Utc::now(),
            )
            .await?;
            settle(&mut *conn, &clan.name).await?;
            Ok(true)
        }
        .await;
        let admitted = tx.finish(result).await?;

        tracing::info!(clan = %name, request_id = %request_id, admitted, "Join request approved");
        Ok(admitted)
    }

    /// Drop a join request; an already-removed request is a no-op
    pub async fn deny_request(
        &self,
        actor_id: &EntityId,
        name: &str,
        request_id: &EntityId,
    ) -> Result<bool, AppError> {
        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<bool, AppError> = async {
            let clan = clans::require(&mut *conn, name.trim()).await?;
            require_moderator(&mut *conn, actor_id, &clan.name).await?;
            match clans::find_join_request(&mut *conn, &clan.name, request_id).await? {
                Some(request) => clans::delete_join_request(&mut *conn, &request.id).await,
                None => Ok(false),
            }
        }
        .await;
        tx.finish(result).await
    }

    /// Invite an unaffiliated user
    pub async fn invite(
        &self,
        actor_id: &EntityId,
        name: &str,
        target_id: &EntityId,
    ) -> Result<ClanInvite, AppError> {
        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<ClanInvite, AppError> = async {
            let clan = clans::require(&mut *conn, name.trim()).await?;
            require_moderator(&mut *conn, actor_id, &clan.name).await?;
            if !users::exists(&mut *conn, target_id).await? {
                return Err(AppError::NotFound);
            }
            if clans::membership_of(&mut *conn, target_id).await?.is_some() {
                return Err(AppError::conflict("user already in a clan"));
            }

            let invite = ClanInvite {
                id: EntityId::new(),
                user_id: target_id.clone(),
                clan_name: clan.name,
                from_user_id: actor_id.clone(),
                created_at: Utc::now(),
            };
            clans::insert_invite(&mut *conn, &invite).await?;
            Ok(invite)
        }
        .await;
        let invite = tx.finish(result).await?;

        tracing::info!(clan = %invite.clan_name, user_id = %target_id, "Clan invite sent");
        Ok(invite)
    }

    pub async fn invites(&self, user_id: &EntityId) -> Result<Vec<InviteView>, AppError> {
        let mut conn = self.db.acquire().await?;
        let invites = clans::invites_for(&mut conn, user_id).await?;

        let senders: Vec<EntityId> = invites.iter().map(|i| i.from_user_id.clone()).collect();
        let summaries: HashMap<EntityId, UserSummary> = users::summaries(&mut conn, &senders)
            .await?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();

        Ok(invites
            .into_iter()
            .filter_map(|invite| {
                summaries.get(&invite.from_user_id).map(|from| InviteView {
                    id: invite.id,
                    clan_name: invite.clan_name,
                    from: from.clone(),
                    created_at: invite.created_at,
                })
            })
            .collect())
    }

    /// Consume the invite and join its clan; returns the clan name
    pub async fn accept_invite(
        &self,
        user_id: &EntityId,
        invite_id: &EntityId,
    ) -> Result<String, AppError> {
        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<String, AppError> = async {
            let invite = clans::find_invite(&mut *conn, user_id, invite_id)
                .await?
                .ok_or(AppError::NotFound)?;
            if clans::membership_of(&mut *conn, user_id).await?.is_some() {
                return Err(AppError::conflict("already in a clan"));
            }
            clans::delete_invite(&mut *conn, &invite.id).await?;
            clans::insert_membership(
                &mut *conn,
                user_id,
                &invite.clan_name,
                ClanRole::Member,
                Utc::now(),
            )
            .await?;
            settle(&mut *conn, &invite.clan_name).await?;
            Ok(invite.clan_name)
        }
        .await;
        let clan_name = tx.finish(result).await?;

        tracing::info!(clan = %clan_name, user_id = %user_id, "Clan invite accepted");
        Ok(clan_name)
    }

    pub async fn deny_invite(
        &self,
        user_id: &EntityId,
        invite_id: &EntityId,
    ) -> Result<bool, AppError> {
        let mut conn = self.db.acquire().await?;
        match clans::find_invite(&mut conn, user_id, invite_id).await? {
            Some(invite) => clans::delete_invite(&mut conn, &invite.id).await,
            None => Ok(false),
        }
    }

    /// Move a member between `officer` and `member`
    pub async fn set_role(
        &self,
        actor_id: &EntityId,
        name: &str,
        target_id: &EntityId,
        role: ClanRole,
    ) -> Result<(), AppError> {
        if role == ClanRole::Leader {
            return Err(AppError::validation("use a leadership transfer to appoint a leader"));
        }

        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<(), AppError> = async {
            let clan = clans::require(&mut *conn, name.trim()).await?;
            require_leader(&mut *conn, actor_id, &clan.name).await?;
            match role_in(&mut *conn, target_id, &clan.name).await? {
                None => Err(AppError::NotFound),
                Some(ClanRole::Leader) => {
                    Err(AppError::forbidden("the leader's role cannot be changed"))
                }
                Some(_) => clans::set_role(&mut *conn, target_id, role).await,
            }
        }
        .await;
        tx.finish(result).await?;

        tracing::info!(
            clan = %name,
            user_id = %target_id,
            role = role.as_str(),
            "Clan role changed"
        );
        Ok(())
    }

    /// Remove a member; a user who is no longer a member is a no-op
    pub async fn kick(
        &self,
        actor_id: &EntityId,
        name: &str,
        target_id: &EntityId,
    ) -> Result<bool, AppError> {
        if actor_id == target_id {
            return Err(AppError::validation("the leader cannot kick themselves"));
        }

        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<bool, AppError> = async {
            let clan = clans::require(&mut *conn, name.trim()).await?;
            require_leader(&mut *conn, actor_id, &clan.name).await?;
            if role_in(&mut *conn, target_id, &clan.name).await?.is_none() {
                return Ok(false);
            }
            clans::delete_membership(&mut *conn, target_id).await?;
            settle(&mut *conn, &clan.name).await?;
            Ok(true)
        }
        .await;
        let kicked = tx.finish(result).await?;

        if kicked {
            tracing::info!(clan = %name, user_id = %target_id, "Member kicked");
        }
        Ok(kicked)
    }

    /// Leave the actor's clan; returns whether the clan was dissolved
    ///
    /// # Errors
    /// `Validation` if the actor is unaffiliated, `Conflict` if the actor
    /// leads a clan that still has other members.
    pub async fn leave(&self, actor_id: &EntityId) -> Result<bool, AppError> {
        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<(String, bool), AppError> = async {
            let membership = clans::membership_of(&mut *conn, actor_id)
                .await?
                .ok_or_else(|| AppError::validation("not in a clan"))?;
            let clan_name = membership.clan_name;

            if membership.role == ClanRole::Leader
                && clans::member_count(&mut *conn, &clan_name).await? > 1
            {
                return Err(AppError::conflict(
                    "transfer leadership before leaving the clan",
                ));
            }

            clans::delete_membership(&mut *conn, actor_id).await?;
            settle(&mut *conn, &clan_name).await?;
            let dissolved = clans::find(&mut *conn, &clan_name).await?.is_none();
            Ok((clan_name, dissolved))
        }
        .await;
        let (clan_name, dissolved) = tx.finish(result).await?;

        tracing::info!(clan = %clan_name, user_id = %actor_id, dissolved, "Member left clan");
        Ok(dissolved)
    }

    /// Hand leadership to another member; the old leader becomes an officer
    pub async fn transfer_leadership(
        &self,
        actor_id: &EntityId,
        name: &str,
        target_id: &EntityId,
    ) -> Result<(), AppError> {
        if actor_id == target_id {
            return Err(AppError::validation("already the leader"));
        }

        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<(), AppError> = async {
            let clan = clans::require(&mut *conn, name.trim()).await?;
            require_leader(&mut *conn, actor_id, &clan.name).await?;
            if role_in(&mut *conn, target_id, &clan.name).await?.is_none() {
                return Err(AppError::NotFound);
            }
            // Demote first: the schema allows one leader per clan
            clans::set_role(&mut *conn, actor_id, ClanRole::Officer).await?;
            clans::set_role(&mut *conn, target_id, ClanRole::Leader).await
        }
        .await;
        tx.finish(result).await?;

        tracing::info!(clan = %name, from = %actor_id, to = %target_id, "Leadership transferred");
        Ok(())
    }

    pub async fn update_settings(
        &self,
        actor_id: &EntityId,
        name: &str,
        settings: ClanSettings,
    ) -> Result<Clan, AppError> {
        let motto = capped(&settings.motto, MAX_MOTTO_CHARS);
        let announcement = capped(&settings.announcement, MAX_ANNOUNCEMENT_CHARS);

        let mut tx = self.db.begin_immediate().await?;
        let conn = tx.conn();
        let result: Result<Clan, AppError> = async {
            let mut clan = clans::require(&mut *conn, name.trim()).await?;
            require_leader(&mut *conn, actor_id, &clan.name).await?;

            clan.motto = motto;
            clan.announcement = announcement;
            clan.is_private = settings.is_private.unwrap_or(clan.is_private);
            clans::update_settings(
                &mut *conn,
                &clan.name,
                &clan.motto,
                &clan.announcement,
                clan.is_private,
            )
            .await?;
            Ok(clan)
        }
        .await;
        tx.finish(result).await
    }

    async fn present_requests(
        &self,
        conn: &mut SqliteConnection,
        pending: Vec<JoinRequest>,
    ) -> Result<Vec<JoinRequestView>, AppError> {
        let ids: Vec<EntityId> = pending.iter().map(|r| r.user_id.clone()).collect();
        let summaries: HashMap<EntityId, UserSummary> = users::summaries(conn, &ids)
            .await?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();

        Ok(pending
            .into_iter()
            .filter_map(|request| {
                summaries.get(&request.user_id).map(|user| JoinRequestView {
                    id: request.id,
                    user: user.clone(),
                    created_at: request.created_at,
                })
            })
            .collect())
    }
}
