//! E2E tests for conversations, messages and live fan-out

mod common;

use clanhall::data::{EntityId, NotificationKind};
use clanhall::realtime::{Inbox, RealtimeEvent, conversation_room};
use common::{TestServer, TestUser};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::mpsc;

async fn open_conversation(server: &TestServer, from: &TestUser, to: &TestUser) -> String {
    let conversation = server
        .post_json(from, "/api/conversations", json!({ "userId": to.id }))
        .await;
    conversation["id"].as_str().unwrap().to_string()
}

async fn send(server: &TestServer, from: &TestUser, conversation_id: &str, content: &str) -> Value {
    let response = server
        .post(
            from,
            "/api/messages",
            json!({ "conversationId": conversation_id, "content": content }),
        )
        .await;
    assert_eq!(response.status(), 201);
    response.json().await.unwrap()
}

/// Wait for the next event matching `predicate`, skipping others
async fn next_matching(
    inbox: &mut Inbox,
    predicate: impl Fn(&RealtimeEvent) -> bool,
) -> RealtimeEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), inbox.recv())
            .await
            .expect("timed out waiting for event")
            .expect("inbox closed");
        if predicate(&event) {
            return (*event).clone();
        }
    }
}

#[tokio::test]
async fn test_get_or_create_is_idempotent() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;
    let bob = server.create_user("bob", false).await;

    let first = open_conversation(&server, &alice, &bob).await;
    let second = open_conversation(&server, &bob, &alice).await;
    assert_eq!(first, second);

    let conversation = server
        .get_json(&alice, &format!("/api/conversations/{}", first))
        .await;
    assert_eq!(conversation["participant"]["id"], bob.id.as_str());
    assert_eq!(conversation["online"], false);

    let response = server
        .post(&alice, "/api/conversations", json!({ "userId": alice.id }))
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_send_and_list_messages() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;
    let bob = server.create_user("bob", false).await;
    let conversation_id = open_conversation(&server, &alice, &bob).await;

    let message = send(&server, &alice, &conversation_id, "hi bob").await;
    assert_eq!(message["type"], "text");
    assert_eq!(message["sender"]["id"], alice.id.as_str());
    send(&server, &bob, &conversation_id, "hi alice").await;

    let messages = server
        .get_json(&bob, &format!("/api/conversations/{}/messages", conversation_id))
        .await;
    let contents: Vec<&str> = messages
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["hi bob", "hi alice"]);

    let list = server.get_json(&alice, "/api/conversations").await;
    assert_eq!(list[0]["lastMessage"]["content"], "hi alice");

    let notifications = server.get_json(&bob, "/api/notifications").await;
    assert_eq!(notifications[0]["type"], "message");

    let response = server
        .post(
            &alice,
            "/api/messages",
            json!({ "conversationId": conversation_id, "content": "  " }),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_file_message_uses_file_name() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;
    let bob = server.create_user("bob", false).await;
    let conversation_id = open_conversation(&server, &alice, &bob).await;

    let message = server
        .post_json(
            &alice,
            "/api/messages",
            json!({
                "conversationId": conversation_id,
                "file": {
                    "url": "https://media.example.com/f/1",
                    "name": "photo.jpg",
                    "size": 1024,
                    "mime": "image/jpeg"
                }
            }),
        )
        .await;
    assert_eq!(message["type"], "image");
    assert_eq!(message["content"], "photo.jpg");
    assert_eq!(message["file"]["size"], 1024);
}

#[tokio::test]
async fn test_outsiders_are_forbidden() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;
    let bob = server.create_user("bob", false).await;
    let eve = server.create_user("eve", false).await;
    let conversation_id = open_conversation(&server, &alice, &bob).await;

    let response = server
        .get(&eve, &format!("/api/conversations/{}/messages", conversation_id))
        .await;
    assert_eq!(response.status(), 403);

    let response = server
        .post(
            &eve,
            "/api/messages",
            json!({ "conversationId": conversation_id, "content": "let me in" }),
        )
        .await;
    assert_eq!(response.status(), 403);

    let response = server
        .get(&eve, "/api/conversations/01ARZ3NDEKTSV4RRFFQ69G5FAV")
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_block_stops_existing_conversation() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;
    let bob = server.create_user("bob", false).await;
    let conversation_id = open_conversation(&server, &alice, &bob).await;
    let before = send(&server, &alice, &conversation_id, "before").await;

    server
        .post_json(&bob, &format!("/api/users/{}/block", alice.id), json!({}))
        .await;

    let response = server
        .post(
            &bob,
            "/api/messages/seen",
            json!({ "conversationId": conversation_id, "messageIds": [before["id"]] }),
        )
        .await;
    assert_eq!(response.status(), 403);

    let response = server
        .post(
            &alice,
            "/api/messages",
            json!({ "conversationId": conversation_id, "content": "after" }),
        )
        .await;
    assert_eq!(response.status(), 403);

    let response = server
        .get(&alice, &format!("/api/conversations/{}/messages", conversation_id))
        .await;
    assert_eq!(response.status(), 403);

    let list = server.get_json(&alice, "/api/conversations").await;
    assert!(list.as_array().unwrap().is_empty());

    let response = server
        .post(&alice, "/api/conversations", json!({ "userId": bob.id }))
        .await;
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_edit_delete_and_react() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;
    let bob = server.create_user("bob", false).await;
    let conversation_id = open_conversation(&server, &alice, &bob).await;
    let message = send(&server, &alice, &conversation_id, "tpyo").await;
    let message_id = message["id"].as_str().unwrap().to_string();

    // Only the sender may edit
    let response = server
        .put(&bob, &format!("/api/messages/{}", message_id), json!({ "content": "x" }))
        .await;
    assert_eq!(response.status(), 404);

    let edited: Value = server
        .put(
            &alice,
            &format!("/api/messages/{}", message_id),
            json!({ "content": "typo" }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(edited["content"], "typo");
    assert!(edited["editedAt"].is_string());

    let reactions = server
        .post_json(
            &bob,
            &format!("/api/messages/{}/react", message_id),
            json!({ "emoji": "👍" }),
        )
        .await;
    assert_eq!(reactions.as_array().unwrap().len(), 1);
    assert_eq!(reactions[0]["userId"], bob.id.as_str());

    let reactions = server
        .post_json(
            &bob,
            &format!("/api/messages/{}/react", message_id),
            json!({ "emoji": "👍" }),
        )
        .await;
    assert!(reactions.as_array().unwrap().is_empty());

    let response = server
        .post(
            &bob,
            &format!("/api/messages/{}/react", message_id),
            json!({ "emoji": "" }),
        )
        .await;
    assert_eq!(response.status(), 400);

    let response = server.delete(&alice, &format!("/api/messages/{}", message_id)).await;
    assert_eq!(response.status(), 200);
    let response = server.delete(&alice, &format!("/api/messages/{}", message_id)).await;
    assert_eq!(response.status(), 404);

    let messages = server
        .get_json(&bob, &format!("/api/conversations/{}/messages", conversation_id))
        .await;
    assert!(messages[0]["deletedAt"].is_string());
}

#[tokio::test]
async fn test_seen_marks_only_received_messages() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;
    let bob = server.create_user("bob", false).await;
    let conversation_id = open_conversation(&server, &alice, &bob).await;
    let from_alice = send(&server, &alice, &conversation_id, "one").await;
    let from_bob = send(&server, &bob, &conversation_id, "two").await;

    let seen = server
        .post_json(
            &bob,
            "/api/messages/seen",
            json!({
                "conversationId": conversation_id,
                "messageIds": [from_alice["id"], from_bob["id"]],
            }),
        )
        .await;
    assert_eq!(seen, json!([from_alice["id"]]));

    let messages = server
        .get_json(&alice, &format!("/api/conversations/{}/messages", conversation_id))
        .await;
    assert_eq!(messages[0]["seen"], true);
    assert_eq!(messages[1]["seen"], false);
}

#[tokio::test]
async fn test_live_sessions_receive_message_then_notification() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;
    let bob = server.create_user("bob", false).await;
    let conversation_id = open_conversation(&server, &alice, &bob).await;

    let (outbox, mut inbox) = mpsc::unbounded_channel();
    let registration = server.state.registry.register(bob.id.clone(), outbox).await;
    assert!(registration.came_online);
    let room = conversation_room(&EntityId::from(conversation_id.as_str()));
    assert!(
        server
            .state
            .registry
            .join_room(registration.connection_id, &room)
            .await
    );

    let conversation = server
        .get_json(&alice, &format!("/api/conversations/{}", conversation_id))
        .await;
    assert_eq!(conversation["online"], true);

    send(&server, &alice, &conversation_id, "are you there?").await;

    let mut order = Vec::new();
    while order.len() < 2 {
        let event = next_matching(&mut inbox, |event| {
            matches!(
                event,
                RealtimeEvent::MessageNew(_) | RealtimeEvent::NotificationNew(_)
            )
        })
        .await;
        order.push(event);
    }

    match &order[0] {
        RealtimeEvent::MessageNew(message) => assert_eq!(message.content, "are you there?"),
        other => panic!("expected message:new first, got {}", other.name()),
    }
    match &order[1] {
        RealtimeEvent::NotificationNew(envelope) => {
            assert_eq!(envelope.notification.kind, NotificationKind::Message);
            assert_eq!(envelope.notification.from.id, alice.id);
        }
        other => panic!("expected notification:new second, got {}", other.name()),
    }

    let departure = server
        .state
        .registry
        .deregister(registration.connection_id)
        .await
        .unwrap();
    assert!(departure.went_offline_at.is_some());
}

#[tokio::test]
async fn test_reactions_reach_the_room() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;
    let bob = server.create_user("bob", false).await;
    let conversation_id = open_conversation(&server, &alice, &bob).await;
    let message = send(&server, &alice, &conversation_id, "react to this").await;
    let message_id = message["id"].as_str().unwrap().to_string();

    let (outbox, mut inbox) = mpsc::unbounded_channel();
    let registration = server.state.registry.register(alice.id.clone(), outbox).await;
    let room = conversation_room(&EntityId::from(conversation_id.as_str()));
    server
        .state
        .registry
        .join_room(registration.connection_id, &room)
        .await;

    server
        .post_json(
            &bob,
            &format!("/api/messages/{}/react", message_id),
            json!({ "emoji": "🔥" }),
        )
        .await;

    let event = next_matching(&mut inbox, |event| {
        matches!(event, RealtimeEvent::MessageReaction(_))
    })
    .await;
    let RealtimeEvent::MessageReaction(changed) = event else {
        unreachable!()
    };
    assert_eq!(changed.id.as_str(), message_id);
    assert_eq!(changed.reactions.len(), 1);
    assert_eq!(changed.reactions[0].emoji, "🔥");
}
