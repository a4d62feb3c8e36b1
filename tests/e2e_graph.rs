//! E2E tests for follows, follow requests, blocks and profiles

mod common;

use common::TestServer;
use serde_json::json;

#[tokio::test]
async fn test_follow_public_user() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;
    let bob = server.create_user("bob", false).await;

    let outcome = server
        .post_json(&alice, &format!("/api/users/{}/follow", bob.id), json!({}))
        .await;
    assert_eq!(outcome["following"], true);
    assert_eq!(outcome["requested"], false);

    let profile = server.get_json(&alice, &format!("/api/users/{}", bob.id)).await;
    assert_eq!(profile["followers"], 1);
    assert_eq!(profile["isFollowing"], true);

    // Following again changes nothing
    server
        .post_json(&alice, &format!("/api/users/{}/follow", bob.id), json!({}))
        .await;
    let notifications = server.get_json(&bob, "/api/notifications").await;
    assert_eq!(notifications.as_array().unwrap().len(), 1);
    assert_eq!(notifications[0]["type"], "follow");
}

#[tokio::test]
async fn test_self_follow_is_conflict() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;

    let response = server
        .post(&alice, &format!("/api/users/{}/follow", alice.id), json!({}))
        .await;
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn test_private_follow_request_and_approve() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;
    let carol = server.create_user("carol", true).await;

    let outcome = server
        .post_json(&alice, &format!("/api/users/{}/follow", carol.id), json!({}))
        .await;
    assert_eq!(outcome["requested"], true);
    assert_eq!(outcome["following"], false);

    let profile = server.get_json(&alice, &format!("/api/users/{}", carol.id)).await;
    assert_eq!(profile["requested"], true);

    let pending = server.get_json(&carol, "/api/users/me/follow-requests").await;
    assert_eq!(common::ids(&pending), vec![alice.id.to_string()]);

    server
        .post_json(
            &carol,
            &format!("/api/users/me/follow-requests/{}/approve", alice.id),
            json!({}),
        )
        .await;

    let pending = server.get_json(&carol, "/api/users/me/follow-requests").await;
    assert!(pending.as_array().unwrap().is_empty());

    let notifications = server.get_json(&alice, "/api/notifications").await;
    assert_eq!(notifications[0]["type"], "follow_approved");
    assert_eq!(notifications[0]["from"]["id"], carol.id.as_str());

    let profile = server.get_json(&alice, &format!("/api/users/{}", carol.id)).await;
    assert_eq!(profile["isFollowing"], true);
    assert_eq!(profile["requested"], false);
}

#[tokio::test]
async fn test_deny_follow_request() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;
    let carol = server.create_user("carol", true).await;

    server
        .post_json(&alice, &format!("/api/users/{}/follow", carol.id), json!({}))
        .await;
    let ack = server
        .post_json(
            &carol,
            &format!("/api/users/me/follow-requests/{}/deny", alice.id),
            json!({}),
        )
        .await;
    assert_eq!(ack["changed"], true);

    let ack = server
        .post_json(
            &carol,
            &format!("/api/users/me/follow-requests/{}/deny", alice.id),
            json!({}),
        )
        .await;
    assert_eq!(ack["changed"], false);
}

#[tokio::test]
async fn test_block_severs_follows_both_ways() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;
    let bob = server.create_user("bob", false).await;

    server
        .post_json(&alice, &format!("/api/users/{}/follow", bob.id), json!({}))
        .await;
    server
        .post_json(&bob, &format!("/api/users/{}/follow", alice.id), json!({}))
        .await;

    server
        .post_json(&bob, &format!("/api/users/{}/block", alice.id), json!({}))
        .await;

    let me = server.get_json(&bob, "/api/users/me").await;
    assert_eq!(me["followers"], 0);
    assert_eq!(me["following"], 0);

    // The blocked user can neither see nor follow the blocker
    let response = server.get(&alice, &format!("/api/users/{}", bob.id)).await;
    assert_eq!(response.status(), 403);
    let response = server
        .post(&alice, &format!("/api/users/{}/follow", bob.id), json!({}))
        .await;
    assert_eq!(response.status(), 403);

    let ack: serde_json::Value = server
        .delete(&bob, &format!("/api/users/{}/block", alice.id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(ack["changed"], true);
    let response = server.get(&alice, &format!("/api/users/{}", bob.id)).await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_private_posts_need_a_follow() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;
    let carol = server.create_user("carol", true).await;

    let post_id = server.create_post(&carol, "members only").await;

    let response = server.get(&alice, &format!("/api/posts/{}", post_id)).await;
    assert_eq!(response.status(), 403);
    let response = server.get(&alice, &format!("/api/users/{}/posts", carol.id)).await;
    assert_eq!(response.status(), 403);

    server
        .post_json(&alice, &format!("/api/users/{}/follow", carol.id), json!({}))
        .await;
    server
        .post_json(
            &carol,
            &format!("/api/users/me/follow-requests/{}/approve", alice.id),
            json!({}),
        )
        .await;

    let post = server.get_json(&alice, &format!("/api/posts/{}", post_id)).await;
    assert_eq!(post["content"], "members only");
}

#[tokio::test]
async fn test_update_profile() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;

    let response = server
        .put(&alice, "/api/users/me", json!({ "username": "  " }))
        .await;
    assert_eq!(response.status(), 400);

    let response = server
        .put(
            &alice,
            "/api/users/me",
            json!({ "username": "Alice A.", "bio": "hello", "isPrivate": true }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let profile: serde_json::Value = response.json().await.unwrap();
    assert_eq!(profile["username"], "Alice A.");
    assert_eq!(profile["bio"], "hello");
    assert_eq!(profile["isPrivate"], true);

    let me = server.get_json(&alice, "/api/users/me").await;
    assert_eq!(me["username"], "Alice A.");
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;

    let response = server
        .get(&alice, "/api/users/01ARZ3NDEKTSV4RRFFQ69G5FAV")
        .await;
    assert_eq!(response.status(), 404);
}
