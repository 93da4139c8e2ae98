//! Shared helpers for the integration tests: an in-memory application
//! state and request plumbing for the router.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::prelude::*;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

use backend::api;
use backend::config::Config;
use backend::crypto::Envelope;
use backend::db::Store;
use backend::state::AppState;

/// A 32-byte session token clients would generate.
pub const TOKEN: [u8; 32] = [7; 32];

pub async fn test_state() -> AppState {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("in-memory database");
    let store = Store::new(pool);
    store.init_schema().await.expect("schema");
    let envelope = Envelope::ephemeral(2048).expect("key pair");
    let config = Config {
        database_url: ":memory:".to_string(),
        bind_addr: "127.0.0.1:0".parse().expect("addr"),
        rsa_key_path: "unused.pem".into(),
        rsa_key_bits: 2048,
        elo_k_factor: 32.0,
        timer_check_interval: Duration::from_secs(0),
        session_max_age_days: 30,
        hibp_enabled: false,
        email_from: "test@kasupel.example".to_string(),
    };
    AppState::new(config, store, envelope)
        .await
        .expect("app state")
}

pub fn router(state: &AppState) -> Router {
    api::router(state.clone())
}

pub async fn send_json(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    dispatch(app, request).await
}

/// POST an RSA-encrypted JSON body, as clients of [E] endpoints do.
pub async fn send_encrypted(
    app: &Router,
    state: &AppState,
    uri: &str,
    body: Value,
) -> (StatusCode, Value) {
    let ciphertext = state
        .envelope
        .encrypt(body.to_string().as_bytes())
        .expect("encrypt");
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::from(ciphertext))
        .expect("request");
    dispatch(app, request).await
}

pub async fn send_get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    dispatch(app, request).await
}

pub async fn send_delete(app: &Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .expect("request");
    dispatch(app, request).await
}

async fn dispatch(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("dispatch");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Register an account through the API and mark its email verified.
pub async fn register_verified(app: &Router, state: &AppState, username: &str) -> i64 {
    let (status, body) = send_encrypted(
        app,
        state,
        "/accounts/create",
        serde_json::json!({
            "username": username,
            "password": "correct horse battery",
            "email": format!("{username}@example.com"),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT, "create failed: {body}");
    let user = state
        .store
        .user_by_username(username)
        .await
        .expect("query")
        .expect("user exists");
    state
        .store
        .mark_email_verified(user.id)
        .await
        .expect("verify");
    user.id
}

/// Log an account in, returning `(session_id, token_query_fragment)`.
pub async fn login(app: &Router, state: &AppState, username: &str) -> (i64, String) {
    let (status, body) = send_encrypted(
        app,
        state,
        "/accounts/login",
        serde_json::json!({
            "username": username,
            "password": "correct horse battery",
            "token": BASE64_STANDARD.encode(TOKEN),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    let session_id = body["session_id"].as_i64().expect("session id");
    let token = urlencode(&BASE64_STANDARD.encode(TOKEN));
    (session_id, token)
}

/// Query-string fragment carrying the session credentials.
pub fn session_query(session_id: i64, token: &str) -> String {
    format!("session_id={session_id}&session_token={token}")
}

/// Percent-encode the characters base64 can produce.
pub fn urlencode(raw: &str) -> String {
    raw.replace('+', "%2B").replace('/', "%2F").replace('=', "%3D")
}
