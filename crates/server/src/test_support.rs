use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::util::ServiceExt;
use uuid::Uuid;

use crate::{
    build_router,
    config::Config,
    db::{self, Database},
    services::auth::{issue_token, TokenType},
    AppState,
};

pub struct TestApp {
    pub state: AppState,
    router: Router,
}

pub struct TestUser {
    pub id: String,
    pub token: String,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = Database::connect_in_memory().await.unwrap();
        db.run_migrations().await.unwrap();

        let state = AppState {
            db,
            config: Config {
                port: 0,
                database_url: "sqlite::memory:".to_string(),
                jwt_secret: "test-secret".to_string(),
                access_token_minutes: 5,
                refresh_token_days: 1,
            },
        };

        Self {
            router: build_router(state.clone()),
            state,
        }
    }

    /// Inserts a user that cannot log in with a password and hands back an
    /// access token for it, skipping the cost of hashing.
    pub async fn user(&self, username: &str) -> TestUser {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO users (id, username, password_hash, created_at) VALUES (?, ?, '!', ?)",
        )
        .bind(&id)
        .bind(username)
        .bind(db::timestamp())
        .execute(&self.state.db.pool)
        .await
        .unwrap();

        let token = issue_token(&id, username, TokenType::Access, &self.state.config).unwrap();
        TestUser { id, token }
    }

    /// The raw response text, for assertions JSON comparison cannot make
    /// (such as key order).
    pub async fn request_text(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, String) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, text) = self.request_text(method, uri, token, body).await;
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        (status, body)
    }

    pub async fn get(&self, user: &TestUser, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(&user.token), None).await
    }

    pub async fn post(&self, user: &TestUser, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(&user.token), Some(body))
            .await
    }

    pub async fn put(&self, user: &TestUser, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, Some(&user.token), Some(body))
            .await
    }

    pub async fn patch(&self, user: &TestUser, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PATCH, uri, Some(&user.token), Some(body))
            .await
    }

    pub async fn delete(&self, user: &TestUser, uri: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, Some(&user.token), None)
            .await
    }

    pub async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&self.state.db.pool)
            .await
            .unwrap()
    }

    pub async fn count_where(&self, sql: &str, param: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(sql)
            .bind(param)
            .fetch_one(&self.state.db.pool)
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn health_check_needs_no_token() {
    let app = TestApp::new().await;
    let (status, body) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = TestApp::new().await;
    let user = app.user("tester").await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/goals/")
        .header("Authorization", format!("Bearer {}", user.token))
        .header("Content-Type", "application/json")
        .body(Body::from("{\"title\": "))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn token_of_deleted_user_is_rejected() {
    let app = TestApp::new().await;
    let user = app.user("tester").await;

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&user.id)
        .execute(&app.state.db.pool)
        .await
        .unwrap();

    let (status, _) = app.get(&user, "/api/goals/").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
