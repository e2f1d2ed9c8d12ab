//! Integration tests for the HTTP adapter
//!
//! Requests go through the full router (middleware included) without a socket.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use authservice::{
    api::create_router,
    auth::{models::Client, AuthEngine, PasswordHasher, TokenCodec},
    store::{CredentialStore, InMemoryCredentialStore},
};

async fn app() -> Router {
    let store = Arc::new(InMemoryCredentialStore::new());
    let now = Utc::now();
    store
        .create_client(&Client {
            client_id: "c1".to_string(),
            name: "web".to_string(),
            secret_hash: "unused".to_string(),
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();

    let engine = AuthEngine::new(
        store,
        TokenCodec::new("http-test-secret-0123456789abcdef"),
        PasswordHasher::new(4),
    );
    create_router(Arc::new(engine))
}

async fn post(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn register_and_login(app: &Router) -> (String, String) {
    let (status, body) = post(
        app,
        "/api/auth/register",
        json!({
            "username": "alice",
            "email": "alice@x.com",
            "password": "password123",
            "client_id": "c1"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = post(
        app,
        "/api/auth/login",
        json!({"email": "alice@x.com", "password": "password123", "client_id": "c1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    (
        body["access_token"].as_str().unwrap().to_string(),
        body["refresh_token"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn test_health() {
    let app = app().await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "serving");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_login_flow_over_http() {
    let app = app().await;
    let (access, refresh) = register_and_login(&app).await;

    let (status, body) = post(&app, "/api/auth/validate", json!({"access_token": access})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);

    let (status, body) = post(&app, "/api/auth/profile", json!({"access_token": access})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "alice@x.com");
    assert!(body["user"].get("password_hash").is_none());

    let (status, body) = post(
        &app,
        "/api/auth/refresh",
        json!({"refresh_token": refresh, "client_id": "c1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let new_refresh = body["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(new_refresh, refresh);

    let (status, body) = post(&app, "/api/auth/validate", json!({"access_token": access})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["valid"], false);
    assert_eq!(body["error"], "invalid");

    let (status, _) = post(&app, "/api/auth/logout", json!({"refresh_token": new_refresh})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = post(&app, "/api/auth/logout", json!({"refresh_token": new_refresh})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn test_error_statuses() {
    let app = app().await;
    register_and_login(&app).await;

    let (status, body) = post(
        &app,
        "/api/auth/register",
        json!({"username": "alice", "email": "alice@x.com", "password": "password123", "client_id": "c1"}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "already_exists");

    let (status, body) = post(
        &app,
        "/api/auth/register",
        json!({"username": "bob", "email": "bob", "password": "password123", "client_id": "c1"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["message"], "invalid email format");

    let (status, body) = post(
        &app,
        "/api/auth/login",
        json!({"email": "alice@x.com", "password": "password123", "client_id": "unknown"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_client");

    let (status, body) = post(
        &app,
        "/api/auth/login",
        json!({"email": "alice@x.com", "password": "wrong-password", "client_id": "c1"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");
    assert!(body.get("access_token").is_none());

    let (status, body) = post(&app, "/api/auth/validate", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Access token is required");
}

#[tokio::test]
async fn test_change_password_over_http() {
    let app = app().await;
    let (access, _) = register_and_login(&app).await;

    let (status, body) = post(
        &app,
        "/api/auth/change-password",
        json!({
            "access_token": access,
            "current_password": "password123",
            "new_password": "another-password"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);

    let (status, _) = post(&app, "/api/auth/validate", json!({"access_token": access})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
