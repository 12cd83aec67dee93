//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use courier_api::state::AppState;
use courier_broker::MemoryBroker;
use courier_client::ClientConfig;
use courier_core::context::Context;
use courier_core::registry::TypeRegistry;
use courier_core::storage::Storage;
use courier_event_store::MemoryStorage;
use http_body_util::BodyExt;
use tower::ServiceExt;

/// A running app plus handles the tests need to observe it.
pub struct TestApp {
    pub state: AppState,
    pub broker: Arc<MemoryBroker>,
}

impl TestApp {
    /// A fresh router over the shared state.
    pub fn router(&self) -> Router {
        courier_api::app(self.state.clone())
    }

    /// Waits until every in-flight delivery has reached the projection.
    pub async fn settle(&self) {
        self.broker.flush().await;
    }
}

/// Build the full app over `storage` with an in-memory broker, opened and
/// registered the same way `main.rs` does it.
pub async fn build_test_app_with(storage: Arc<dyn Storage>) -> TestApp {
    let registry = Arc::new(TypeRegistry::new());
    let broker = Arc::new(MemoryBroker::new(Arc::clone(&registry)));
    let state = AppState::assemble(storage, broker.clone(), registry, ClientConfig::default())
        .await
        .unwrap();
    state.client.open(&Context::new()).await.unwrap();
    TestApp { state, broker }
}

/// Build the full app over in-memory storage.
pub async fn build_test_app() -> TestApp {
    build_test_app_with(Arc::new(MemoryStorage::new())).await
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}
