//! E2E tests for posts, likes, comments, reposts and per-user lists

mod common;

use clanhall::data::EntityId;
use common::TestServer;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_create_post() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;

    let response = server
        .post(&alice, "/api/posts", json!({ "content": "hello #world" }))
        .await;
    assert_eq!(response.status(), 201);
    let post: serde_json::Value = response.json().await.unwrap();
    assert_eq!(post["content"], "hello #world");
    assert_eq!(post["mediaType"], "none");
    assert_eq!(post["author"]["id"], alice.id.as_str());
    assert_eq!(post["likes"], 0);

    let response = server
        .post(&alice, "/api/posts", json!({ "content": "   " }))
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_media_post_defaults_to_image() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;

    let post = server
        .post_json(
            &alice,
            "/api/posts",
            json!({ "mediaUrl": "https://media.example.com/cat.png" }),
        )
        .await;
    assert_eq!(post["mediaType"], "image");
}

#[tokio::test]
async fn test_like_toggles_and_notifies_once() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;
    let bob = server.create_user("bob", false).await;
    let post_id = server.create_post(&bob, "like me").await;

    let outcome = server
        .post_json(&alice, &format!("/api/posts/{}/like", post_id), json!({}))
        .await;
    assert_eq!(outcome["liked"], true);
    assert_eq!(outcome["likes"], 1);

    let outcome = server
        .post_json(&alice, &format!("/api/posts/{}/like", post_id), json!({}))
        .await;
    assert_eq!(outcome["liked"], false);
    assert_eq!(outcome["likes"], 0);

    let notifications = server.get_json(&bob, "/api/notifications").await;
    let likes: Vec<_> = notifications
        .as_array()
        .unwrap()
        .iter()
        .filter(|n| n["type"] == "like")
        .collect();
    assert_eq!(likes.len(), 1);
    assert_eq!(likes[0]["post"]["id"], post_id.as_str());
}

#[tokio::test]
async fn test_own_like_does_not_notify() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;
    let post_id = server.create_post(&alice, "mine").await;

    server
        .post_json(&alice, &format!("/api/posts/{}/like", post_id), json!({}))
        .await;

    let count = server.get_json(&alice, "/api/notifications/unread_count").await;
    assert_eq!(count["count"], 0);
}

#[tokio::test]
async fn test_comments() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;
    let bob = server.create_user("bob", false).await;
    let post_id = server.create_post(&bob, "thoughts?").await;

    let response = server
        .post(
            &alice,
            &format!("/api/posts/{}/comments", post_id),
            json!({ "text": "  " }),
        )
        .await;
    assert_eq!(response.status(), 400);

    let response = server
        .post(
            &alice,
            &format!("/api/posts/{}/comments", post_id),
            json!({ "text": " nice " }),
        )
        .await;
    assert_eq!(response.status(), 201);

    let comments = server
        .get_json(&bob, &format!("/api/posts/{}/comments", post_id))
        .await;
    let comments = comments.as_array().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["text"], "nice");
    assert_eq!(comments[0]["user"]["id"], alice.id.as_str());

    let post = server.get_json(&bob, &format!("/api/posts/{}", post_id)).await;
    assert_eq!(post["comments"], 1);

    let notifications = server.get_json(&bob, "/api/notifications").await;
    assert_eq!(notifications[0]["type"], "comment");
}

#[tokio::test]
async fn test_repost_once_and_delete_rules() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;
    let bob = server.create_user("bob", false).await;
    let post_id = server.create_post(&bob, "original").await;

    let response = server
        .post(&alice, &format!("/api/posts/{}/repost", post_id), json!({}))
        .await;
    assert_eq!(response.status(), 201);
    let repost: serde_json::Value = response.json().await.unwrap();
    assert_eq!(repost["repostOf"], post_id.as_str());
    let repost_id = repost["id"].as_str().unwrap().to_string();

    let response = server
        .post(&alice, &format!("/api/posts/{}/repost", post_id), json!({}))
        .await;
    assert_eq!(response.status(), 409);

    let notifications = server.get_json(&bob, "/api/notifications").await;
    assert_eq!(notifications[0]["type"], "repost");

    // Only the owner may delete the original
    let response = server.delete(&alice, &format!("/api/posts/{}", post_id)).await;
    assert_eq!(response.status(), 403);

    // The original's author may remove a repost of it
    let response = server.delete(&bob, &format!("/api/posts/{}", repost_id)).await;
    assert_eq!(response.status(), 200);
    let response = server.get(&alice, &format!("/api/posts/{}", repost_id)).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_bookmarks_and_hidden_lists() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;
    let bob = server.create_user("bob", false).await;
    let post_id = server.create_post(&bob, "save me").await;

    let toggled = server
        .post_json(&alice, &format!("/api/posts/{}/bookmark", post_id), json!({}))
        .await;
    assert_eq!(toggled["bookmarked"], true);
    let bookmarks = server.get_json(&alice, "/api/users/me/bookmarks").await;
    assert_eq!(common::ids(&bookmarks), vec![post_id.clone()]);

    let toggled = server
        .post_json(&alice, &format!("/api/posts/{}/bookmark", post_id), json!({}))
        .await;
    assert_eq!(toggled["bookmarked"], false);
    let bookmarks = server.get_json(&alice, "/api/users/me/bookmarks").await;
    assert!(bookmarks.as_array().unwrap().is_empty());

    server
        .post_json(&alice, &format!("/api/posts/{}/hide", post_id), json!({}))
        .await;
    let hidden = server.get_json(&alice, "/api/users/me/hidden").await;
    assert_eq!(common::ids(&hidden), vec![post_id.clone()]);

    server.delete(&alice, &format!("/api/posts/{}/hide", post_id)).await;
    let hidden = server.get_json(&alice, "/api/users/me/hidden").await;
    assert!(hidden.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_pin_is_author_only() {
    let server = TestServer::new().await;
    let alice = server.create_user("alice", false).await;
    let bob = server.create_user("bob", false).await;
    let first = server.create_post(&alice, "first").await;
    let second = server.create_post(&alice, "second").await;

    let response = server
        .post(&bob, &format!("/api/posts/{}/pin", first), json!({}))
        .await;
    assert_eq!(response.status(), 403);

    let response = server
        .post(&bob, "/api/posts/01ARZ3NDEKTSV4RRFFQ69G5FAV/pin", json!({}))
        .await;
    assert_eq!(response.status(), 404);

    for post_id in [&first, &second] {
        let ack = server
            .post_json(&alice, &format!("/api/posts/{}/pin", post_id), json!({}))
            .await;
        assert_eq!(ack["changed"], true);
    }
    let ack = server
        .post_json(&alice, &format!("/api/posts/{}/pin", first), json!({}))
        .await;
    assert_eq!(ack["changed"], false);

    let profile = server.get_json(&bob, &format!("/api/users/{}", alice.id)).await;
    assert_eq!(profile["pinnedPosts"], json!([second, first]));

    let pinned = server
        .get_json(&bob, &format!("/api/users/{}/pinned", alice.id))
        .await;
    assert_eq!(common::ids(&pinned), vec![second.clone(), first.clone()]);

    let ack: serde_json::Value = server
        .delete(&alice, &format!("/api/posts/{}/pin", second))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(ack["changed"], true);

    // Deleting a post drops its pin
    server.delete(&alice, &format!("/api/posts/{}", first)).await;
    let profile = server.get_json(&alice, "/api/users/me").await;
    assert!(profile["pinnedPosts"].as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_with_cold_profiles() {
    let server = TestServer::new().await;
    let viewer = server.create_user("viewer", false).await;

    let mut posts = Vec::new();
    for i in 0..16 {
        let author = server.create_user(&format!("author{}", i), false).await;
        let post_id = server.create_post(&author, "cold").await;
        server.state.profile_cache.invalidate(&author.id).await;
        posts.push(EntityId::from(post_id.as_str()));
    }

    // More readers than pooled connections, each missing the profile cache
    let mut tasks = Vec::new();
    for post_id in posts {
        let service = server.state.posts.clone();
        let viewer_id = viewer.id.clone();
        tasks.push(tokio::spawn(async move {
            service.get(&viewer_id, &post_id).await
        }));
    }

    let results = tokio::time::timeout(Duration::from_secs(10), futures::future::join_all(tasks))
        .await
        .expect("reads stalled on the connection pool");
    for result in results {
        let item = result.unwrap().unwrap();
        assert_eq!(item.post.content, "cold");
    }
}
