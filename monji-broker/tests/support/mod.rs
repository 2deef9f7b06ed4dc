#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header::AUTHORIZATION};
use jsonwebtoken::{EncodingKey, Header, encode};
use monji_broker::AppState;
use monji_core::{CipherKey, EnvironmentStore, GrantStore, MemoryStore, Role, UserDirectory};
use serde::Serialize;
use serde_json::Value;
use tower::ServiceExt;

pub const JWT_SECRET: &[u8] = b"integration-test-secret";

pub const ROOT: i64 = 1;
pub const BOB: i64 = 2;
pub const CAROL: i64 = 3;

#[derive(Serialize)]
struct TestClaims {
    sub: String,
    exp: i64,
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs() as i64
}

pub fn token_with_ttl(user: i64, ttl_secs: i64) -> String {
    let claims = TestClaims {
        sub: user.to_string(),
        exp: now().saturating_add(ttl_secs),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET),
    )
    .expect("encode token")
}

pub fn token(user: i64) -> String {
    token_with_ttl(user, 3600)
}

pub fn seeded_store() -> Arc<MemoryStore> {
    Arc::new(
        MemoryStore::new()
            .with_user(ROOT, Role::Superadmin)
            .with_user(BOB, Role::User)
            .with_user(CAROL, Role::User),
    )
}

pub fn app_with<S>(store: Arc<S>) -> (Router, AppState)
where
    S: EnvironmentStore + GrantStore + UserDirectory + 'static,
{
    let key = CipherKey::generate().expect("key");
    let state =
        monji_broker::state_with_store(store, &key, JWT_SECRET, Duration::from_secs(5));
    (monji_broker::http::router(state.clone()), state)
}

pub fn app() -> (Router, Arc<MemoryStore>) {
    let store = seeded_store();
    let (router, _) = app_with(store.clone());
    (router, store)
}

pub struct TestResponse {
    pub status: StatusCode,
    pub correlation_id: Option<String>,
    pub raw: String,
    pub json: Value,
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user: Option<i64>,
    body: Option<Value>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", token(user)));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();
    send_request(app, request).await
}

pub async fn send_request(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let correlation_id = response
        .headers()
        .get("x-correlation-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let raw = String::from_utf8_lossy(&bytes).into_owned();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    TestResponse {
        status,
        correlation_id,
        raw,
        json,
    }
}
