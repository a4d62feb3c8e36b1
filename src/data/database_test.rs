//! Database tests

use super::*;
use chrono::{Duration, Utc};
use tempfile::TempDir;

use crate::error::AppError;

/// Helper to create a test database
async fn create_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::connect(&db_path).await.unwrap();
    (db, temp_dir)
}

async fn create_user(db: &Database, tag: &str) -> EntityId {
    let user = User {
        id: EntityId::new(),
        username: tag.to_string(),
        user_tag: tag.to_string(),
        avatar: String::new(),
        bio: String::new(),
        is_private: false,
        status: PresenceStatus::Offline,
        last_seen: None,
        created_at: Utc::now(),
    };
    let mut conn = db.acquire().await.unwrap();
    users::insert(&mut conn, &user).await.unwrap();
    user.id
}

async fn create_post(db: &Database, author: &EntityId) -> EntityId {
    let id = EntityId::new();
    let mut conn = db.acquire().await.unwrap();
    posts::insert(
        &mut conn,
        &posts::NewPost {
            id: &id,
            author_id: author,
            content: "hello",
            media_url: "",
            media_type: "none",
            repost_of: None,
            created_at: Utc::now(),
        },
        &[],
    )
    .await
    .unwrap();
    id
}

#[tokio::test]
async fn test_database_connection() {
    let (_db, _temp_dir) = create_test_db().await;
    // Connection successful if we get here without panicking
}

#[tokio::test]
async fn test_user_insert_and_tag_uniqueness() {
    let (db, _temp_dir) = create_test_db().await;
    let alice = create_user(&db, "alice").await;

    let mut conn = db.acquire().await.unwrap();
    let found = users::find(&mut conn, &alice).await.unwrap().unwrap();
    assert_eq!(found.user_tag, "alice");
    assert_eq!(found.status, PresenceStatus::Offline);

    let duplicate = User {
        id: EntityId::new(),
        user_tag: "ALICE".to_string(),
        ..found
    };
    let result = users::insert(&mut conn, &duplicate).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_presence_keeps_last_seen_when_not_given() {
    let (db, _temp_dir) = create_test_db().await;
    let alice = create_user(&db, "alice").await;
    let mut conn = db.acquire().await.unwrap();

    let seen = Utc::now();
    users::set_presence(&mut conn, &alice, PresenceStatus::Offline, Some(seen))
        .await
        .unwrap();
    users::set_presence(&mut conn, &alice, PresenceStatus::Online, None)
        .await
        .unwrap();

    let user = users::find(&mut conn, &alice).await.unwrap().unwrap();
    assert_eq!(user.status, PresenceStatus::Online);
    assert!(user.last_seen.is_some());
}

#[tokio::test]
async fn test_edges_are_idempotent_and_sever_both_ways() {
    let (db, _temp_dir) = create_test_db().await;
    let alice = create_user(&db, "alice").await;
    let bob = create_user(&db, "bob").await;
    let mut conn = db.acquire().await.unwrap();

    assert!(graph::insert_edge(&mut conn, graph::Edge::Follow, &alice, &bob).await.unwrap());
    assert!(!graph::insert_edge(&mut conn, graph::Edge::Follow, &alice, &bob).await.unwrap());
    graph::insert_edge(&mut conn, graph::Edge::Follow, &bob, &alice).await.unwrap();
    graph::insert_edge(&mut conn, graph::Edge::FollowRequest, &bob, &alice)
        .await
        .unwrap();

    graph::sever(&mut conn, &alice, &bob).await.unwrap();

    assert!(!graph::has_edge(&mut conn, graph::Edge::Follow, &alice, &bob).await.unwrap());
    assert!(!graph::has_edge(&mut conn, graph::Edge::Follow, &bob, &alice).await.unwrap());
    assert!(
        !graph::has_edge(&mut conn, graph::Edge::FollowRequest, &bob, &alice)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_block_lookup_is_symmetric() {
    let (db, _temp_dir) = create_test_db().await;
    let alice = create_user(&db, "alice").await;
    let bob = create_user(&db, "bob").await;
    let mut conn = db.acquire().await.unwrap();

    graph::insert_edge(&mut conn, graph::Edge::Block, &alice, &bob).await.unwrap();

    assert!(graph::is_blocked_either(&mut conn, &alice, &bob).await.unwrap());
    assert!(graph::is_blocked_either(&mut conn, &bob, &alice).await.unwrap());
}

#[tokio::test]
async fn test_view_counted_once_per_viewer() {
    let (db, _temp_dir) = create_test_db().await;
    let alice = create_user(&db, "alice").await;
    let bob = create_user(&db, "bob").await;
    let post = create_post(&db, &alice).await;

    for _ in 0..3 {
        let mut tx = db.begin_immediate().await.unwrap();
        let conn = tx.conn();
        let result = posts::record_view(conn, &post, &bob).await;
        tx.finish(result).await.unwrap();
    }

    let mut conn = db.acquire().await.unwrap();
    let post = posts::find(&mut conn, &post).await.unwrap().unwrap();
    assert_eq!(post.views, 1);
}

#[tokio::test]
async fn test_like_toggle_and_counts() {
    let (db, _temp_dir) = create_test_db().await;
    let alice = create_user(&db, "alice").await;
    let bob = create_user(&db, "bob").await;
    let post = create_post(&db, &alice).await;
    let mut conn = db.acquire().await.unwrap();

    assert!(posts::toggle_like(&mut conn, &post, &bob).await.unwrap());
    assert_eq!(posts::like_count(&mut conn, &post).await.unwrap(), 1);
    assert!(!posts::toggle_like(&mut conn, &post, &bob).await.unwrap());
    assert_eq!(posts::like_count(&mut conn, &post).await.unwrap(), 0);
}

#[tokio::test]
async fn test_second_repost_conflicts() {
    let (db, _temp_dir) = create_test_db().await;
    let alice = create_user(&db, "alice").await;
    let bob = create_user(&db, "bob").await;
    let original = create_post(&db, &alice).await;
    let mut conn = db.acquire().await.unwrap();

    let first = EntityId::new();
    let second = EntityId::new();

    for (id, expect_ok) in [(&first, true), (&second, false)] {
        let result = posts::insert(
            &mut conn,
            &posts::NewPost {
                id,
                author_id: &bob,
                content: "",
                media_url: "",
                media_type: "none",
                repost_of: Some(&original),
                created_at: Utc::now(),
            },
            &[],
        )
        .await;
        assert_eq!(result.is_ok(), expect_ok);
        if !expect_ok {
            assert!(matches!(result, Err(AppError::Conflict(_))));
        }
    }
}

#[tokio::test]
async fn test_ensure_leader_promotes_earliest_member_once() {
    let (db, _temp_dir) = create_test_db().await;
    let alice = create_user(&db, "alice").await;
    let bob = create_user(&db, "bob").await;
    let mut conn = db.acquire().await.unwrap();

    let now = Utc::now();
    clans::insert(
        &mut conn,
        &Clan {
            name: "Wolves".to_string(),
            motto: String::new(),
            announcement: String::new(),
            is_private: false,
            created_at: now,
        },
    )
    .await
    .unwrap();
    clans::insert_membership(&mut conn, &bob, "wolves", ClanRole::Member, now)
        .await
        .unwrap();
    clans::insert_membership(
        &mut conn,
        &alice,
        "WOLVES",
        ClanRole::Member,
        now + Duration::seconds(5),
    )
    .await
    .unwrap();

    let promoted = clans::ensure_leader(&mut conn, "Wolves").await.unwrap();
    assert_eq!(promoted, Some(bob.clone()));
    assert_eq!(clans::ensure_leader(&mut conn, "Wolves").await.unwrap(), None);
    assert_eq!(clans::leader_of(&mut conn, "wolves").await.unwrap(), Some(bob));
}

#[tokio::test]
async fn test_second_leader_is_rejected_by_store() {
    let (db, _temp_dir) = create_test_db().await;
    let alice = create_user(&db, "alice").await;
    let bob = create_user(&db, "bob").await;
    let mut conn = db.acquire().await.unwrap();

    let now = Utc::now();
    clans::insert(
        &mut conn,
        &Clan {
            name: "Owls".to_string(),
            motto: String::new(),
            announcement: String::new(),
            is_private: false,
            created_at: now,
        },
    )
    .await
    .unwrap();
    clans::insert_membership(&mut conn, &alice, "Owls", ClanRole::Leader, now)
        .await
        .unwrap();
    clans::insert_membership(&mut conn, &bob, "Owls", ClanRole::Member, now)
        .await
        .unwrap();

    assert!(clans::set_role(&mut conn, &bob, ClanRole::Leader).await.is_err());
}

#[tokio::test]
async fn test_hashtag_counts_and_literal_search() {
    let (db, _temp_dir) = create_test_db().await;
    let alice = create_user(&db, "alice").await;
    let mut conn = db.acquire().await.unwrap();

    for (content, tags) in [
        ("#rust 100%", vec!["#rust"]),
        ("#rust and #rustfmt", vec!["#rust", "#rustfmt"]),
        ("#go", vec!["#go"]),
    ] {
        let id = EntityId::new();
        let tags: Vec<String> = tags.into_iter().map(String::from).collect();
        posts::insert(
            &mut conn,
            &posts::NewPost {
                id: &id,
                author_id: &alice,
                content,
                media_url: "",
                media_type: "none",
                repost_of: None,
                created_at: Utc::now(),
            },
            &tags,
        )
        .await
        .unwrap();
    }

    let counts = posts::top_hashtags(&mut conn, "RUST", 10).await.unwrap();
    let counts: Vec<(&str, i64)> = counts.iter().map(|h| (h.tag.as_str(), h.count)).collect();
    assert_eq!(counts, vec![("#rust", 2), ("#rustfmt", 1)]);

    let found = posts::search(&mut conn, "0%", 10).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].content, "#rust 100%");

    assert!(posts::search(&mut conn, "_", 10).await.unwrap().is_empty());
    assert_eq!(users::search(&mut conn, "LIC", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_reset_presence_clears_online_rows() {
    let (db, _temp_dir) = create_test_db().await;
    let alice = create_user(&db, "alice").await;
    create_user(&db, "bob").await;
    let mut conn = db.acquire().await.unwrap();
    users::set_presence(&mut conn, &alice, PresenceStatus::Online, None)
        .await
        .unwrap();

    assert_eq!(users::reset_presence(&mut conn).await.unwrap(), 1);
    assert_eq!(users::reset_presence(&mut conn).await.unwrap(), 0);
    let found = users::require(&mut conn, &alice).await.unwrap();
    assert_eq!(found.status, PresenceStatus::Offline);
}

#[tokio::test]
async fn test_conversation_get_or_create_is_pair_keyed() {
    let (db, _temp_dir) = create_test_db().await;
    let alice = create_user(&db, "alice").await;
    let bob = create_user(&db, "bob").await;
    let mut conn = db.acquire().await.unwrap();

    let first = messages::get_or_create_conversation(&mut conn, &alice, &bob)
        .await
        .unwrap();
    let second = messages::get_or_create_conversation(&mut conn, &bob, &alice)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert!(first.has_participant(&alice));
    assert_eq!(first.other_participant(&alice), &bob);
}

#[tokio::test]
async fn test_reaction_toggle_and_seen() {
    let (db, _temp_dir) = create_test_db().await;
    let alice = create_user(&db, "alice").await;
    let bob = create_user(&db, "bob").await;
    let mut conn = db.acquire().await.unwrap();
    let conversation = messages::get_or_create_conversation(&mut conn, &alice, &bob)
        .await
        .unwrap();

    let from_alice = EntityId::new();
    let from_bob = EntityId::new();
    for (id, sender) in [(&from_alice, &alice), (&from_bob, &bob)] {
        messages::insert_message(
            &mut conn,
            &messages::NewMessage {
                id,
                conversation_id: &conversation.id,
                sender_id: sender,
                content: "hi",
                message_type: MessageType::Text,
                file: None,
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();
    }

    assert!(messages::toggle_reaction(&mut conn, &from_alice, &bob, "👍").await.unwrap());
    assert_eq!(messages::reactions(&mut conn, &from_alice).await.unwrap().len(), 1);
    assert!(!messages::toggle_reaction(&mut conn, &from_alice, &bob, "👍").await.unwrap());
    assert!(messages::reactions(&mut conn, &from_alice).await.unwrap().is_empty());

    // Bob reading both only marks Alice's message
    let seen = messages::mark_seen(
        &mut conn,
        &conversation.id,
        &bob,
        &[from_alice.clone(), from_bob.clone()],
    )
    .await
    .unwrap();
    assert_eq!(seen, vec![from_alice]);

    let conversation = messages::require_conversation(&mut conn, &conversation.id)
        .await
        .unwrap();
    assert_eq!(conversation.last_message_id, Some(from_bob));
}

#[tokio::test]
async fn test_soft_delete_clears_payload() {
    let (db, _temp_dir) = create_test_db().await;
    let alice = create_user(&db, "alice").await;
    let bob = create_user(&db, "bob").await;
    let mut conn = db.acquire().await.unwrap();
    let conversation = messages::get_or_create_conversation(&mut conn, &alice, &bob)
        .await
        .unwrap();

    let id = EntityId::new();
    let file = FileMeta {
        url: "https://media.example/a.png".to_string(),
        name: "a.png".to_string(),
        size: 42,
        mime: "image/png".to_string(),
    };
    messages::insert_message(
        &mut conn,
        &messages::NewMessage {
            id: &id,
            conversation_id: &conversation.id,
            sender_id: &alice,
            content: "look",
            message_type: MessageType::Image,
            file: Some(&file),
            created_at: Utc::now(),
        },
    )
    .await
    .unwrap();

    messages::soft_delete_message(&mut conn, &id, Utc::now())
        .await
        .unwrap();

    let message = messages::find_message(&mut conn, &id).await.unwrap().unwrap();
    assert!(message.content.is_empty());
    assert!(message.file_meta().is_none());
    assert!(message.deleted_at.is_some());
}

#[tokio::test]
async fn test_mark_all_read_is_idempotent() {
    let (db, _temp_dir) = create_test_db().await;
    let alice = create_user(&db, "alice").await;
    let bob = create_user(&db, "bob").await;
    let mut conn = db.acquire().await.unwrap();

    for kind in [NotificationKind::Follow, NotificationKind::Message] {
        notifications::insert(
            &mut conn,
            &Notification {
                id: EntityId::new(),
                user_id: alice.clone(),
                from_id: bob.clone(),
                kind,
                post_id: None,
                read: false,
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();
    }

    assert_eq!(notifications::unread_count(&mut conn, &alice).await.unwrap(), 2);
    assert_eq!(notifications::mark_all_read(&mut conn, &alice).await.unwrap(), 2);
    assert_eq!(notifications::mark_all_read(&mut conn, &alice).await.unwrap(), 0);
    assert_eq!(notifications::unread_count(&mut conn, &alice).await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_transaction_rolls_back() {
    let (db, _temp_dir) = create_test_db().await;
    let alice = create_user(&db, "alice").await;
    let bob = create_user(&db, "bob").await;

    let mut tx = db.begin_immediate().await.unwrap();
    let conn = tx.conn();
    let result: Result<(), AppError> = async {
        graph::insert_edge(&mut *conn, graph::Edge::Follow, &alice, &bob).await?;
        Err(AppError::conflict("abort"))
    }
    .await;
    assert!(tx.finish(result).await.is_err());

    let mut conn = db.acquire().await.unwrap();
    assert!(!graph::has_edge(&mut conn, graph::Edge::Follow, &alice, &bob).await.unwrap());
}
