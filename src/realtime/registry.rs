//! Live session registry
//!
//! Tracks which users are connected through which sessions and which rooms
//! each session has joined. Delivery is fire-and-forget: outboxes are
//! collected under the lock and written to after it is released, and a send
//! to a session that has gone away is counted and dropped.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, mpsc};

use super::events::{PresenceUpdate, RealtimeEvent};
use crate::data::{EntityId, PresenceStatus};
use crate::metrics::{
    REALTIME_DELIVERY_FAILURES, REALTIME_EVENTS_DELIVERED, REALTIME_SESSIONS_ACTIVE, USERS_ONLINE,
};

/// Identifies one live connection
pub type ConnectionId = u64;

/// Sending half of a session's event queue
pub type Outbox = mpsc::UnboundedSender<Arc<RealtimeEvent>>;

/// Receiving half, drained by the connection's writer task
pub type Inbox = mpsc::UnboundedReceiver<Arc<RealtimeEvent>>;

/// Room key for a conversation
pub fn conversation_room(conversation_id: &EntityId) -> String {
    format!("conversation:{}", conversation_id)
}

struct SessionEntry {
    user_id: EntityId,
    rooms: HashSet<String>,
    outbox: Outbox,
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<ConnectionId, SessionEntry>,
    /// Live sessions per user; a user is online iff present here
    users: HashMap<EntityId, HashSet<ConnectionId>>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

impl RegistryState {
    fn outboxes_except(&self, except: ConnectionId) -> Vec<Outbox> {
        self.sessions
            .iter()
            .filter(|(id, _)| **id != except)
            .map(|(_, session)| session.outbox.clone())
            .collect()
    }

    fn update_gauges(&self) {
        REALTIME_SESSIONS_ACTIVE.set(self.sessions.len() as i64);
        USERS_ONLINE.set(self.users.len() as i64);
    }
}

/// Result of registering a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub connection_id: ConnectionId,
    /// True if this was the user's first live session
    pub came_online: bool,
}

/// Result of deregistering a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub user_id: EntityId,
    /// Set when the user's last session closed
    pub went_offline_at: Option<DateTime<Utc>>,
}

/// Shared registry of live sessions
///
/// Created once at startup and handed to every component that delivers
/// events.
#[derive(Default)]
pub struct SessionRegistry {
    state: RwLock<RegistryState>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a verified session and announce presence if it is the user's
    /// first one
    pub async fn register(&self, user_id: EntityId, outbox: Outbox) -> Registration {
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;

        let (came_online, others) = {
            let mut state = self.state.write().await;
            state.sessions.insert(
                connection_id,
                SessionEntry {
                    user_id: user_id.clone(),
                    rooms: HashSet::new(),
                    outbox,
                },
            );
            let sessions = state.users.entry(user_id.clone()).or_default();
            sessions.insert(connection_id);
            let came_online = sessions.len() == 1;
            state.update_gauges();

            let others = if came_online {
                state.outboxes_except(connection_id)
            } else {
                Vec::new()
            };
            (came_online, others)
        };

        if came_online {
            let event = RealtimeEvent::PresenceUpdate(PresenceUpdate {
                user_id: user_id.clone(),
                status: PresenceStatus::Online,
                last_seen: None,
            });
            deliver(others, Arc::new(event));
        }

        tracing::info!(user_id = %user_id, connection_id, came_online, "Session registered");

        Registration {
            connection_id,
            came_online,
        }
    }

    /// Remove a session from every room and from its user's session set
    ///
    /// Returns `None` for an unknown connection, so a double deregister is
    /// harmless.
    pub async fn deregister(&self, connection_id: ConnectionId) -> Option<Departure> {
        let (user_id, went_offline_at, others) = {
            let mut state = self.state.write().await;
            let session = state.sessions.remove(&connection_id)?;

            for room in &session.rooms {
                if let Some(members) = state.rooms.get_mut(room) {
                    members.remove(&connection_id);
                    if members.is_empty() {
                        state.rooms.remove(room);
                    }
                }
            }

            let went_offline = match state.users.get_mut(&session.user_id) {
                Some(sessions) => {
                    sessions.remove(&connection_id);
                    sessions.is_empty()
                }
                None => false,
            };

            let (went_offline_at, others) = if went_offline {
                state.users.remove(&session.user_id);
                (Some(Utc::now()), state.outboxes_except(connection_id))
            } else {
                (None, Vec::new())
            };
            state.update_gauges();

            (session.user_id, went_offline_at, others)
        };

        if let Some(last_seen) = went_offline_at {
            let event = RealtimeEvent::PresenceUpdate(PresenceUpdate {
                user_id: user_id.clone(),
                status: PresenceStatus::Offline,
                last_seen: Some(last_seen),
            });
            deliver(others, Arc::new(event));
        }

        tracing::info!(
            user_id = %user_id,
            connection_id,
            went_offline = went_offline_at.is_some(),
            "Session deregistered"
        );

        Some(Departure {
            user_id,
            went_offline_at,
        })
    }

    /// Add a session to a room; false if the session is unknown
    pub async fn join_room(&self, connection_id: ConnectionId, room: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(session) = state.sessions.get_mut(&connection_id) else {
            return false;
        };
        session.rooms.insert(room.to_string());
        state
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(connection_id);
        true
    }

    pub async fn leave_room(&self, connection_id: ConnectionId, room: &str) {
        let mut state = self.state.write().await;
        if let Some(session) = state.sessions.get_mut(&connection_id) {
            session.rooms.remove(room);
        }
        if let Some(members) = state.rooms.get_mut(room) {
            members.remove(&connection_id);
            if members.is_empty() {
                state.rooms.remove(room);
            }
        }
    }

    /// Deliver to every live session of `user_id`; returns sessions reached
    pub async fn emit_to_user(&self, user_id: &EntityId, event: RealtimeEvent) -> usize {
        let targets: Vec<Outbox> = {
            let state = self.state.read().await;
            state
                .users
                .get(user_id)
                .into_iter()
                .flatten()
                .filter_map(|id| state.sessions.get(id))
                .map(|session| session.outbox.clone())
                .collect()
        };
        deliver(targets, Arc::new(event))
    }

    /// Deliver to every session joined to `room`, optionally skipping one
    pub async fn emit_to_room(
        &self,
        room: &str,
        event: RealtimeEvent,
        except: Option<ConnectionId>,
    ) -> usize {
        let targets: Vec<Outbox> = {
            let state = self.state.read().await;
            state
                .rooms
                .get(room)
                .into_iter()
                .flatten()
                .filter(|id| Some(**id) != except)
                .filter_map(|id| state.sessions.get(id))
                .map(|session| session.outbox.clone())
                .collect()
        };
        deliver(targets, Arc::new(event))
    }

    pub async fn is_online(&self, user_id: &EntityId) -> bool {
        self.state.read().await.users.contains_key(user_id)
    }

    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    /// Sessions currently joined to `room`
    pub async fn room_size(&self, room: &str) -> usize {
        self.state
            .read()
            .await
            .rooms
            .get(room)
            .map_or(0, HashSet::len)
    }

    /// Drop every session; their writer tasks end once the outboxes close
    ///
    /// Returns the users that were online, since their sockets will no
    /// longer see a departure from [`deregister`](Self::deregister).
    pub async fn shutdown(&self) -> Vec<EntityId> {
        let mut state = self.state.write().await;
        let sessions = state.sessions.len();
        let online: Vec<EntityId> = state.users.keys().cloned().collect();
        *state = RegistryState::default();
        state.update_gauges();
        tracing::info!(sessions, users = online.len(), "Session registry shut down");
        online
    }
}

fn deliver(targets: Vec<Outbox>, event: Arc<RealtimeEvent>) -> usize {
    let name = event.name();
    let mut delivered = 0;
    for outbox in targets {
        if outbox.send(event.clone()).is_ok() {
            delivered += 1;
        } else {
            REALTIME_DELIVERY_FAILURES.inc();
            tracing::debug!(event = name, "Dropped event for closed session");
        }
    }
    if delivered > 0 {
        REALTIME_EVENTS_DELIVERED
            .with_label_values(&[name])
            .inc_by(delivered as u64);
    }
    tracing::debug!(event = name, delivered, "Event relayed");
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::events::TypingIndicator;

    fn channel() -> (Outbox, Inbox) {
        mpsc::unbounded_channel()
    }

    fn typing(user: &str) -> RealtimeEvent {
        RealtimeEvent::Typing(TypingIndicator {
            conversation_id: EntityId::from("c1"),
            user_id: EntityId::from(user),
            is_typing: true,
        })
    }

    fn drain(inbox: &mut Inbox) -> Vec<Arc<RealtimeEvent>> {
        let mut events = Vec::new();
        while let Ok(event) = inbox.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn presence_changes_only_at_first_and_last_session() {
        let registry = SessionRegistry::new();
        let alice = EntityId::from("alice");
        let (observer_tx, mut observer_rx) = channel();
        registry.register(EntityId::from("observer"), observer_tx).await;

        let (phone_tx, _phone_rx) = channel();
        let (laptop_tx, _laptop_rx) = channel();
        let phone = registry.register(alice.clone(), phone_tx).await;
        let laptop = registry.register(alice.clone(), laptop_tx).await;
        assert!(phone.came_online);
        assert!(!laptop.came_online);

        let departure = registry.deregister(phone.connection_id).await.unwrap();
        assert!(departure.went_offline_at.is_none());
        assert!(registry.is_online(&alice).await);

        let departure = registry.deregister(laptop.connection_id).await.unwrap();
        assert!(departure.went_offline_at.is_some());
        assert!(!registry.is_online(&alice).await);

        let statuses: Vec<PresenceStatus> = drain(&mut observer_rx)
            .iter()
            .filter_map(|event| match event.as_ref() {
                RealtimeEvent::PresenceUpdate(update) if update.user_id == alice => {
                    Some(update.status)
                }
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![PresenceStatus::Online, PresenceStatus::Offline]);
    }

    #[tokio::test]
    async fn deregister_twice_is_a_no_op() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = channel();
        let registration = registry.register(EntityId::from("alice"), tx).await;

        assert!(registry.deregister(registration.connection_id).await.is_some());
        assert!(registry.deregister(registration.connection_id).await.is_none());
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test]
    async fn user_events_reach_every_device() {
        let registry = SessionRegistry::new();
        let alice = EntityId::from("alice");
        let (phone_tx, mut phone_rx) = channel();
        let (laptop_tx, mut laptop_rx) = channel();
        registry.register(alice.clone(), phone_tx).await;
        registry.register(alice.clone(), laptop_tx).await;

        let delivered = registry.emit_to_user(&alice, typing("bob")).await;

        assert_eq!(delivered, 2);
        assert_eq!(drain(&mut phone_rx).len(), 1);
        assert_eq!(drain(&mut laptop_rx).len(), 1);
    }

    #[tokio::test]
    async fn room_events_skip_sender_and_non_members() {
        let registry = SessionRegistry::new();
        let (a_tx, mut a_rx) = channel();
        let (b_tx, mut b_rx) = channel();
        let (c_tx, mut c_rx) = channel();
        let a = registry.register(EntityId::from("a"), a_tx).await;
        let b = registry.register(EntityId::from("b"), b_tx).await;
        registry.register(EntityId::from("c"), c_tx).await;
        drain(&mut a_rx);
        drain(&mut b_rx);
        drain(&mut c_rx);

        assert!(registry.join_room(a.connection_id, "room").await);
        assert!(registry.join_room(b.connection_id, "room").await);

        let delivered = registry
            .emit_to_room("room", typing("a"), Some(a.connection_id))
            .await;
        assert_eq!(delivered, 1);
        assert!(drain(&mut a_rx).is_empty());
        assert_eq!(drain(&mut b_rx).len(), 1);
        assert!(drain(&mut c_rx).is_empty());

        registry.leave_room(b.connection_id, "room").await;
        assert_eq!(registry.room_size("room").await, 1);
        assert_eq!(registry.emit_to_room("room", typing("a"), None).await, 1);
    }

    #[tokio::test]
    async fn closed_sessions_are_skipped_without_error() {
        let registry = SessionRegistry::new();
        let alice = EntityId::from("alice");
        let (gone_tx, gone_rx) = channel();
        let (live_tx, mut live_rx) = channel();
        registry.register(alice.clone(), gone_tx).await;
        registry.register(alice.clone(), live_tx).await;
        drop(gone_rx);

        assert_eq!(registry.emit_to_user(&alice, typing("bob")).await, 1);
        assert_eq!(drain(&mut live_rx).len(), 1);
    }

    #[tokio::test]
    async fn unknown_connection_cannot_join_rooms() {
        let registry = SessionRegistry::new();
        assert!(!registry.join_room(42, "room").await);
    }

    #[tokio::test]
    async fn shutdown_reports_online_users_once() {
        let registry = SessionRegistry::new();
        let alice = EntityId::from("alice");
        let (phone_tx, _phone_rx) = channel();
        let (laptop_tx, _laptop_rx) = channel();
        let phone = registry.register(alice.clone(), phone_tx).await;
        registry.register(alice.clone(), laptop_tx).await;

        assert_eq!(registry.shutdown().await, vec![alice.clone()]);
        assert!(!registry.is_online(&alice).await);
        assert!(registry.deregister(phone.connection_id).await.is_none());
        assert!(registry.shutdown().await.is_empty());
    }
}
