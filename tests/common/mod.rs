//! Common test utilities for E2E tests

#![allow(dead_code)]

use chrono::Utc;
use clanhall::auth::{Session, create_session_token};
use clanhall::data::{EntityId, PresenceStatus, User, users};
use clanhall::{AppState, config};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// A seeded user and a token for it
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: EntityId,
    pub token: String,
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Boot the full router on an ephemeral port against a fresh database
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                body_limit_bytes: 1_048_576,
            },
            database: config::DatabaseConfig { path: db_path },
            auth: config::AuthConfig {
                session_secret: "test-secret-key-that-is-32-bytes!".to_string(),
                session_max_age: 604800,
            },
            feed: config::FeedConfig {
                page_size: 50,
                global_prefetch: 200,
            },
            cache: config::CacheConfig {
                profile_ttl: 300,
                profile_max_entries: 1000,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        clanhall::metrics::init_metrics();
        let state = AppState::new(config).await.unwrap();

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = clanhall::build_router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: format!("http://{}", addr),
            state,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// WebSocket URL for the realtime endpoint, authenticated as `user`
    pub fn realtime_url(&self, user: &TestUser) -> String {
        format!(
            "{}/api/realtime?token={}",
            self.addr.replacen("http://", "ws://", 1),
            user.token
        )
    }

    /// Insert a user directly into the store and sign a token for them
    pub async fn create_user(&self, tag: &str, is_private: bool) -> TestUser {
        let user = User {
            id: EntityId::new(),
            username: tag.to_string(),
            user_tag: tag.to_string(),
            avatar: String::new(),
            bio: String::new(),
            is_private,
            status: PresenceStatus::Offline,
            last_seen: None,
            created_at: Utc::now(),
        };

        let mut conn = self.state.db.acquire().await.unwrap();
        users::insert(&mut conn, &user).await.unwrap();

        let session = Session::new(user.id.clone(), self.state.config.auth.session_max_age);
        let token = create_session_token(&session, &self.state.config.auth.session_secret)
            .expect("Failed to create test token");

        TestUser { id: user.id, token }
    }

    pub async fn get(&self, user: &TestUser, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(&user.token)
            .send()
            .await
            .unwrap()
    }

    pub async fn post(&self, user: &TestUser, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(&user.token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn put(&self, user: &TestUser, path: &str, body: Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .bearer_auth(&user.token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn delete(&self, user: &TestUser, path: &str) -> reqwest::Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(&user.token)
            .send()
            .await
            .unwrap()
    }

    /// GET and decode, asserting success
    pub async fn get_json(&self, user: &TestUser, path: &str) -> Value {
        let response = self.get(user, path).await;
        assert!(
            response.status().is_success(),
            "GET {} returned {}",
            path,
            response.status()
        );
        response.json().await.unwrap()
    }

    /// POST and decode, asserting success
    pub async fn post_json(&self, user: &TestUser, path: &str, body: Value) -> Value {
        let response = self.post(user, path, body).await;
        assert!(
            response.status().is_success(),
            "POST {} returned {}",
            path,
            response.status()
        );
        response.json().await.unwrap()
    }

    /// Create a post and return its id
    pub async fn create_post(&self, user: &TestUser, content: &str) -> String {
        let post = self
            .post_json(user, "/api/posts", serde_json::json!({ "content": content }))
            .await;
        post["id"].as_str().unwrap().to_string()
    }
}

/// Ids of a JSON array of objects, in order
pub fn ids(value: &Value) -> Vec<String> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap().to_string())
        .collect()
}
