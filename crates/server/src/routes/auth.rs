use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::{self, models::User},
    error::{AppError, Result},
    extract::ValidJson,
    serializers::{FieldErrors, REQUIRED},
    services::auth::{
        decode_token, hash_password, issue_token, issue_token_pair, verify_password, TokenPair,
        TokenType,
    },
    AppState,
};

const USERNAME_MAX_LEN: usize = 150;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register/", post(register))
        .route("/login/", post(login))
        .route("/refresh/", post(refresh))
}

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub access: String,
    pub refresh: String,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub access: String,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn username_taken() -> AppError {
    AppError::Validation("Username already exists.".to_string())
}

async fn register(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<CredentialsRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>)> {
    let (Some(username), Some(password)) = (present(body.username), non_empty(body.password))
    else {
        return Err(AppError::Validation(
            "Username and password are required.".to_string(),
        ));
    };

    if username.chars().count() > USERNAME_MAX_LEN {
        return Err(AppError::Validation(format!(
            "Username must be at most {USERNAME_MAX_LEN} characters."
        )));
    }

    // Check if user already exists
    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE username = ?")
        .bind(&username)
        .fetch_one(&state.db.pool)
        .await?;

    if existing > 0 {
        return Err(username_taken());
    }

    let password_hash = hash_password(&password)?;
    let user_id = Uuid::new_v4().to_string();

    // The UNIQUE constraint settles registrations racing past the check above
    sqlx::query("INSERT INTO users (id, username, password_hash, created_at) VALUES (?, ?, ?, ?)")
        .bind(&user_id)
        .bind(&username)
        .bind(&password_hash)
        .bind(db::timestamp())
        .execute(&state.db.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => username_taken(),
            e => AppError::Database(e),
        })?;

    tracing::info!(user_id, username, "Registered user");

    let tokens = issue_token_pair(&user_id, &username, &state.config)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            access: tokens.access,
            refresh: tokens.refresh,
            username,
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<CredentialsRequest>,
) -> Result<Json<TokenPair>> {
    let (username, password) = match (present(body.username), non_empty(body.password)) {
        (Some(username), Some(password)) => (username, password),
        (username, password) => {
            let mut errors = FieldErrors::default();
            if username.is_none() {
                errors.add("username", REQUIRED);
            }
            if password.is_none() {
                errors.add("password", REQUIRED);
            }
            return Err(AppError::Invalid(errors));
        }
    };

    let rejected =
        || AppError::Unauthorized("No active account found with the given credentials".to_string());

    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, password_hash, created_at FROM users WHERE username = ?",
    )
    .bind(&username)
    .fetch_optional(&state.db.pool)
    .await?
    .ok_or_else(rejected)?;

    if !verify_password(&password, &user.password_hash) {
        return Err(rejected());
    }

    Ok(Json(issue_token_pair(&user.id, &user.username, &state.config)?))
}

async fn refresh(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<RefreshRequest>,
) -> Result<Json<AccessResponse>> {
    let Some(token) = present(body.refresh) else {
        let mut errors = FieldErrors::default();
        errors.add("refresh", REQUIRED);
        return Err(AppError::Invalid(errors));
    };

    let claims = decode_token(&token, TokenType::Refresh, &state.config.jwt_secret)?;

    let username = sqlx::query_scalar::<_, String>("SELECT username FROM users WHERE id = ?")
        .bind(&claims.sub)
        .fetch_optional(&state.db.pool)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    let access = issue_token(&claims.sub, &username, TokenType::Access, &state.config)?;

    Ok(Json(AccessResponse { access }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::test_support::TestApp;

    async fn register(
        app: &TestApp,
        username: &str,
        password: &str,
    ) -> (StatusCode, serde_json::Value) {
        app.request(
            Method::POST,
            "/api/auth/register/",
            None,
            Some(json!({ "username": username, "password": password })),
        )
        .await
    }

    #[tokio::test]
    async fn register_returns_tokens_that_authenticate() {
        let app = TestApp::new().await;

        let (status, body) = register(&app, "tester", "pass1234").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["username"], "tester");

        let access = body["access"].as_str().unwrap();
        let (status, _) = app
            .request(Method::GET, "/api/goals/", Some(access), None)
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn register_requires_username_and_password() {
        let app = TestApp::new().await;

        for body in [
            json!({ "username": "tester" }),
            json!({ "password": "pass1234" }),
            json!({ "username": "", "password": "pass1234" }),
            json!({}),
        ] {
            let (status, response) = app
                .request(Method::POST, "/api/auth/register/", None, Some(body))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(response["detail"], "Username and password are required.");
        }
        assert_eq!(app.count("SELECT COUNT(*) FROM users").await, 0);
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected_and_original_login_survives() {
        let app = TestApp::new().await;
        register(&app, "tester", "pass1234").await;

        let (status, body) = register(&app, "tester", "different").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Username already exists.");
        assert_eq!(app.count("SELECT COUNT(*) FROM users").await, 1);

        let (status, body) = app
            .request(
                Method::POST,
                "/api/auth/login/",
                None,
                Some(json!({ "username": "tester", "password": "pass1234" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["access"].is_string());
        assert!(body["refresh"].is_string());
    }

    #[tokio::test]
    async fn login_with_bad_credentials_is_unauthorized() {
        let app = TestApp::new().await;
        register(&app, "tester", "pass1234").await;

        for (username, password) in [("tester", "wrong"), ("nobody", "pass1234")] {
            let (status, body) = app
                .request(
                    Method::POST,
                    "/api/auth/login/",
                    None,
                    Some(json!({ "username": username, "password": password })),
                )
                .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(
                body["detail"],
                "No active account found with the given credentials"
            );
        }
    }

    #[tokio::test]
    async fn login_reports_missing_fields() {
        let app = TestApp::new().await;

        let (status, body) = app
            .request(
                Method::POST,
                "/api/auth/login/",
                None,
                Some(json!({ "username": "tester" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "password": ["This field is required."] }));
    }

    #[tokio::test]
    async fn refresh_issues_a_new_access_token() {
        let app = TestApp::new().await;
        let (_, body) = register(&app, "tester", "pass1234").await;
        let refresh = body["refresh"].as_str().unwrap();

        let (status, body) = app
            .request(
                Method::POST,
                "/api/auth/refresh/",
                None,
                Some(json!({ "refresh": refresh })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let access = body["access"].as_str().unwrap();
        let (status, _) = app
            .request(Method::GET, "/api/dashboard/summary/", Some(access), None)
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn refresh_rejects_access_tokens_and_garbage() {
        let app = TestApp::new().await;
        let (_, body) = register(&app, "tester", "pass1234").await;
        let access = body["access"].as_str().unwrap().to_string();

        for token in [access.as_str(), "not-a-token"] {
            let (status, _) = app
                .request(
                    Method::POST,
                    "/api/auth/refresh/",
                    None,
                    Some(json!({ "refresh": token })),
                )
                .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn refresh_token_is_not_a_bearer_credential() {
        let app = TestApp::new().await;
        let (_, body) = register(&app, "tester", "pass1234").await;
        let refresh = body["refresh"].as_str().unwrap();

        let (status, _) = app
            .request(Method::GET, "/api/goals/", Some(refresh), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
