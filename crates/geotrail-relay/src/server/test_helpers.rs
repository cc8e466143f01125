//! Shared setup for server test modules.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use crate::auth::JwtManager;
use crate::gateway::Gateway;
use crate::storage::TrackingDatabase;

use super::{AppState, build_router};

pub async fn test_state() -> AppState {
    AppState {
        db: TrackingDatabase::open_in_memory().await.unwrap(),
        jwt: Arc::new(JwtManager::new(b"test-secret", 900, 604_800)),
        gateway: Arc::new(Gateway::new()),
        outbound_queue: 16,
        require_ws_token: false,
    }
}

/// State whose database already holds user "user-7" and "user-8".
pub async fn seeded_state() -> AppState {
    let state = test_state().await;
    for (id, email) in [
        ("user-7", "seven@example.com"),
        ("user-8", "eight@example.com"),
    ] {
        state
            .db
            .create_user(id, email, "Test", "User", "hash")
            .await
            .unwrap();
    }
    state
}

/// A valid access token for a seeded user.
pub fn token_for(state: &AppState, user_id: &str) -> String {
    let email = format!("{}@example.com", if user_id == "user-7" { "seven" } else { "eight" });
    state.jwt.issue_pair(user_id, &email).unwrap().access_token
}

/// Send a request through the router and return (status, JSON body).
///
/// Non-JSON bodies come back as a JSON string.
pub async fn send(
    state: &AppState,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let resp = build_router(state.clone())
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}
