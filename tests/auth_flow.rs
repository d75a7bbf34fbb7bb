use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
use tower::ServiceExt; // for `oneshot`
use uuid::Uuid;

use filevault::{
    auth::jwt::{encode_token, make_access_claims, JwtKeys, ACCESS_TTL},
    db::entities::{action_token, refresh_token, user},
    routes::API_PREFIX,
    test_helpers::{test_app, TEST_JWT_SECRET},
};

fn api_path(path: &str) -> String {
    format!("{API_PREFIX}{path}")
}

fn user_model(email: &str, verified: bool) -> user::Model {
    let now = Utc::now().fixed_offset();
    user::Model {
        user_id: Uuid::new_v4(),
        first_name: "Alice".to_string(),
        last_name: "Example".to_string(),
        email: email.to_string(),
        password_hash: bcrypt::hash("supersecret123", 4).expect("hash"),
        is_verified: verified,
        role: "user".to_string(),
        last_login: None,
        version: 1,
        created_at: now,
        updated_at: now,
    }
}

fn action_token_row(user_id: Uuid) -> action_token::Model {
    let now = Utc::now().fixed_offset();
    action_token::Model {
        token_id: Uuid::new_v4(),
        user_id,
        purpose: "email_verification".to_string(),
        token_hash: vec![0u8; 32],
        created_at: now,
        expires_at: now + Duration::hours(24),
        used: false,
    }
}

fn refresh_token_row(user_id: Uuid) -> refresh_token::Model {
    let now = Utc::now().fixed_offset();
    refresh_token::Model {
        refresh_token_id: Uuid::new_v4(),
        user_id,
        token: Uuid::new_v4().to_string(),
        expires_at: now + Duration::days(7),
        created_at: now,
        revoked: false,
    }
}

fn bearer(user: &user::Model) -> String {
    let keys = JwtKeys::from_secret(TEST_JWT_SECRET);
    let claims = make_access_claims(user, ACCESS_TTL);
    format!("Bearer {}", encode_token(&keys, &claims).expect("encode token"))
}

async fn json_body(res: axum::response::Response) -> serde_json::Value {
    let bytes = body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).expect("response should be json")
}

#[tokio::test]
async fn healthcheck_reports_environment_and_version() {
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let dir = tempfile::TempDir::new().unwrap();
    let app = test_app(db, dir.path()).router();

    let res = app
        .oneshot(
            Request::builder()
                .uri(api_path("/healthcheck"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let json = json_body(res).await;
    assert_eq!(json["status"], "available");
    assert_eq!(json["system_info"]["environment"], "testing");
    assert_eq!(json["system_info"]["version"], "test");
}

#[tokio::test]
async fn signup_creates_unverified_user_and_enqueues_email() {
    let created = user_model("alice@example.com", false);
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<user::Model>::new()])
        .append_query_results([vec![created.clone()]])
        .append_query_results([vec![action_token_row(created.user_id)]])
        .into_connection();
    let dir = tempfile::TempDir::new().unwrap();
    let mut test = test_app(db, dir.path());
    let app = test.router();

    let payload = serde_json::json!({
        "email": "alice@example.com",
        "first_name": "Alice",
        "last_name": "Example",
        "password": "supersecret123"
    });
    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(api_path("/auth/signup"))
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    let json = json_body(res).await;
    assert_eq!(json["user"]["is_verified"], false);
    assert_eq!(json["user"]["role"], "user");
    assert_eq!(json["user"]["email"], "alice@example.com");
    assert!(json["user"].get("password_hash").is_none());

    let job = test
        .receivers
        .default
        .try_recv()
        .expect("welcome email task should be enqueued");
    assert_eq!(job.name, "task:email:send");
    assert_eq!(job.payload["template_file"], "welcome.tmpl");
}

#[tokio::test]
async fn signup_with_invalid_body_is_422_with_field_map() {
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let dir = tempfile::TempDir::new().unwrap();
    let app = test_app(db, dir.path()).router();

    let payload = serde_json::json!({
        "email": "not-an-email",
        "first_name": "",
        "last_name": "Example",
        "password": "short"
    });
    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(api_path("/auth/signup"))
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = json_body(res).await;
    assert!(json["error"]["email"].is_string());
    assert!(json["error"]["first_name"].is_string());
    assert!(json["error"]["password"].is_string());
}

#[tokio::test]
async fn login_returns_token_pair() {
    let user = user_model("alice@example.com", true);
    let refresh = refresh_token_row(user.user_id);
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![user.clone()]])
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 1,
        }])
        .append_query_results([vec![refresh]])
        .into_connection();
    let dir = tempfile::TempDir::new().unwrap();
    let app = test_app(db, dir.path()).router();

    let payload = serde_json::json!({"email": "alice@example.com", "password": "supersecret123"});
    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(api_path("/auth/login"))
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let json = json_body(res).await;

    let access = json["tokens"]["access_token"].as_str().expect("access token");
    let keys = JwtKeys::from_secret(TEST_JWT_SECRET);
    let principal =
        filevault::auth::jwt::validate_token(&keys, access).expect("token should verify");
    assert_eq!(principal.email, "alice@example.com");

    let refresh = json["tokens"]["refresh_token"].as_str().expect("refresh token");
    assert!(Uuid::parse_str(refresh).is_ok());
}

#[tokio::test]
async fn login_with_bad_password_is_unauthorized() {
    let user = user_model("alice@example.com", true);
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![user]])
        .into_connection();
    let dir = tempfile::TempDir::new().unwrap();
    let app = test_app(db, dir.path()).router();

    let payload = serde_json::json!({"email": "alice@example.com", "password": "wrong-password"});
    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(api_path("/auth/login"))
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(res).await;
    assert_eq!(json["error"], "invalid credentials");
}

#[tokio::test]
async fn refresh_returns_new_access_token() {
    let user = user_model("alice@example.com", true);
    let token = refresh_token_row(user.user_id);
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![token.clone()]])
        .append_query_results([vec![user]])
        .into_connection();
    let dir = tempfile::TempDir::new().unwrap();
    let app = test_app(db, dir.path()).router();

    let payload = serde_json::json!({"refresh_token": token.token});
    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(api_path("/auth/refresh"))
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let json = json_body(res).await;
    assert!(json["access_token"].as_str().is_some());
}

#[tokio::test]
async fn me_without_token_is_unauthorized() {
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let dir = tempfile::TempDir::new().unwrap();
    let app = test_app(db, dir.path()).router();

    let res = app
        .oneshot(
            Request::builder()
                .uri(api_path("/user/me"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_with_unverified_account_is_forbidden() {
    let user = user_model("alice@example.com", false);
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let dir = tempfile::TempDir::new().unwrap();
    let app = test_app(db, dir.path()).router();

    let res = app
        .oneshot(
            Request::builder()
                .uri(api_path("/user/me"))
                .header("authorization", bearer(&user))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let json = json_body(res).await;
    assert_eq!(
        json["error"],
        "your user account must be activated to access this resource"
    );
}

#[tokio::test]
async fn me_with_verified_bearer_returns_profile() {
    let user = user_model("alice@example.com", true);
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![user.clone()]])
        .into_connection();
    let dir = tempfile::TempDir::new().unwrap();
    let app = test_app(db, dir.path()).router();

    let res = app
        .oneshot(
            Request::builder()
                .uri(api_path("/user/me"))
                .header("authorization", bearer(&user))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let json = json_body(res).await;
    assert_eq!(json["user"]["email"], "alice@example.com");
}

#[tokio::test]
async fn unknown_authorization_scheme_is_rejected() {
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let dir = tempfile::TempDir::new().unwrap();
    let app = test_app(db, dir.path()).router();

    let res = app
        .oneshot(
            Request::builder()
                .uri(api_path("/user/me"))
                .header("authorization", "Basic dXNlcjpwYXNz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(res).await;
    assert_eq!(json["error"], "unsupported authorization scheme");
}

#[tokio::test]
async fn expired_bearer_token_is_unauthorized() {
    let user = user_model("alice@example.com", true);
    let keys = JwtKeys::from_secret(TEST_JWT_SECRET);
    let mut claims = make_access_claims(&user, ACCESS_TTL);
    claims.iat -= 7200;
    claims.exp = claims.iat + 900;
    let token = encode_token(&keys, &claims).expect("encode token");

    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let dir = tempfile::TempDir::new().unwrap();
    let app = test_app(db, dir.path()).router();

    let res = app
        .oneshot(
            Request::builder()
                .uri(api_path("/user/me"))
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(res).await;
    assert_eq!(json["error"], "token has expired");
}

#[tokio::test]
async fn activation_flips_is_verified() {
    let user = user_model("alice@example.com", false);
    let plaintext = "ABCDEFGHIJKLMNOPQRSTUV2345";
    let verified = user::Model {
        is_verified: true,
        version: 2,
        ..user.clone()
    };
    let token_row = action_token::Model {
        token_id: Uuid::new_v4(),
        user_id: user.user_id,
        purpose: "email_verification".to_string(),
        token_hash: filevault::auth::action_token::digest(plaintext).to_vec(),
        created_at: user.created_at,
        expires_at: user.created_at + Duration::hours(24),
        used: false,
    };
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![token_row]])
        .append_query_results([vec![user.clone()]])
        .append_exec_results([
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            },
            MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            },
        ])
        .append_query_results([vec![verified]])
        .into_connection();
    let dir = tempfile::TempDir::new().unwrap();
    let app = test_app(db, dir.path()).router();

    let payload = serde_json::json!({"token": plaintext});
    let res = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(api_path("/user/activated"))
                .header("authorization", bearer(&user))
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let json = json_body(res).await;
    assert_eq!(json["user"]["is_verified"], true);
    assert_eq!(json["user"]["version"], 2);
}

#[tokio::test]
async fn api_key_is_created_and_shown_once() {
    let user = user_model("alice@example.com", true);
    let now = Utc::now().fixed_offset();
    let record = filevault::db::entities::api_key::Model {
        api_key_id: Uuid::new_v4(),
        user_id: user.user_id,
        name: "ci".to_string(),
        key_hash: "$2b$12$abcdefghijklmnopqrstuv".to_string(),
        prefix: "fv9a4fabc12345".to_string(),
        scope: vec!["read".to_string()],
        is_revoked: false,
        revoked_at: None,
        expires_at: now + Duration::days(90),
        last_used_at: None,
        last_used_ip: None,
        created_at: now,
    };

    let mut count_row = std::collections::BTreeMap::new();
    count_row.insert("num_items".to_string(), sea_orm::Value::BigInt(Some(0)));

    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![count_row]])
        .append_query_results([vec![record]])
        .into_connection();
    let dir = tempfile::TempDir::new().unwrap();
    let app = test_app(db, dir.path()).router();

    let payload = serde_json::json!({"key_name": "ci", "scope": ["read"]});
    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(api_path("/user/api-keys"))
                .header("authorization", bearer(&user))
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    let json = json_body(res).await;
    let full_key = json["apiKey"].as_str().expect("api key in response");
    let (prefix, secret) = full_key.split_once('_').expect("prefix_secret shape");
    assert_eq!(prefix, "fv9a4fabc12345");
    assert_eq!(secret.len(), 32);
}
