#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use vibe_poll::config::{Config, PollLimits};
use vibe_poll::db::{PollStore, SqliteStore};
use vibe_poll::routes::create_routes;
use vibe_poll::state::AppState;

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        bind_addr: "127.0.0.1".to_string(),
        port: 0,
        max_connections: 1,
        vote_retry_limit: 3,
        limits: PollLimits::default(),
    }
}

pub async fn test_state() -> Arc<AppState> {
    let store = SqliteStore::in_memory().await.unwrap();
    let store: Arc<dyn PollStore> = Arc::new(store);
    AppState::new(store, &test_config())
}

/// A WAL-mode database file shared by a pool of `connections`. The directory
/// is removed when the returned guard drops.
pub async fn file_state(connections: u32) -> (TempDir, Arc<AppState>) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("polls.db").display());

    let store = SqliteStore::connect(&url, connections).await.unwrap();
    store.migrate().await.unwrap();
    let store: Arc<dyn PollStore> = Arc::new(store);

    let config = Config {
        database_url: url,
        max_connections: connections,
        ..test_config()
    };
    (dir, AppState::new(store, &config))
}

pub async fn test_app() -> (Router, Arc<AppState>) {
    let state = test_state().await;
    (create_routes(state.clone()), state)
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header(CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };

    (status, json)
}
