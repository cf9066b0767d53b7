//! Server test utilities.

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use depot_core::config::AppConfig;
use depot_core::{BroadcastEventSink, DepotEvent};
use depot_server::{AppState, build_state, create_router};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub events: broadcast::Receiver<DepotEvent>,
}

/// A response with its raw body.
#[allow(dead_code)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with in-memory storage and definitions.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = AppConfig::for_testing();
        modifier(&mut config);

        let sink = Arc::new(BroadcastEventSink::new(256));
        let events = sink.subscribe();
        let state = build_state(config, sink)
            .await
            .expect("Failed to build application state");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            events,
        }
    }

    /// Send a request and collect the whole response.
    pub async fn send(&self, request: Request<Body>) -> RawResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        RawResponse {
            status,
            headers,
            body,
        }
    }

    /// Helper to make JSON requests.
    pub async fn json_request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };

        let response = self.send(builder.body(body).unwrap()).await;
        let json = if response.body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&response.body).unwrap_or(Value::Null)
        };
        (response.status, json)
    }

    /// PUT a store definition under its path.
    pub async fn put_store(&self, key: &str, definition: Value) -> (StatusCode, Value) {
        self.json_request("PUT", &store_uri(key), Some(definition))
            .await
    }

    /// Upload raw bytes to a hosted store.
    pub async fn upload(&self, key: &str, path: &str, body: &str) -> StatusCode {
        let request = Request::builder()
            .method("PUT")
            .uri(content_uri(key, path))
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await.status
    }

    /// GET content, returning the raw response.
    pub async fn download(&self, key: &str, path: &str) -> RawResponse {
        let request = Request::builder()
            .method("GET")
            .uri(content_uri(key, path))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Promotion results published so far and not yet drained.
    pub fn drain_promotion_events(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.events.try_recv() {
            if matches!(event, DepotEvent::PromotionCompleted(_)) {
                count += 1;
            }
        }
        count
    }
}

/// `maven:hosted:releases` -> `/v1/admin/stores/maven/hosted/releases`.
#[allow(dead_code)]
pub fn store_uri(key: &str) -> String {
    format!("/v1/admin/stores/{}", key.replace(':', "/"))
}

/// Content URI for `path` in the store `key`.
#[allow(dead_code)]
pub fn content_uri(key: &str, path: &str) -> String {
    format!("/v1/content/{}/{}", key.replace(':', "/"), path)
}

/// True when the sandbox allows binding a local port for an HTTP mock.
#[allow(dead_code)]
pub fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}
