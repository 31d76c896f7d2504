//! Shared setup for ingress and pipeline tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use tower::ServiceExt;

use geo_dispatch::{
    app_state::AppState,
    config::AppConfig,
    routes,
    services::{
        backend::{BackendApi, BackendError, BackendPool, BackendResponse, FixedSelector},
        lifecycle::Lifecycle,
        pipeline::Pipeline,
    },
};

/// Backend that records every call and answers after a short delay.
#[derive(Default)]
pub struct RecordingBackend {
    pub calls: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl BackendApi for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    async fn call(&self, method: &str, url: &str) -> Result<BackendResponse, BackendError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.calls.lock().push((method.to_string(), url.to_string()));
        Ok(BackendResponse {
            backend: "recording".to_string(),
            status: 200,
            latency: Duration::from_millis(10),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub pipeline: Pipeline,
    pub lifecycle: Lifecycle,
    pub backend: Arc<RecordingBackend>,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        poll_interval_ms: 20,
        ..AppConfig::default()
    }
}

/// Full pipeline over in-memory stores with a recording backend.
pub async fn spawn_app() -> TestApp {
    let backend = Arc::new(RecordingBackend::default());
    let backends: Vec<Arc<dyn BackendApi>> = vec![backend.clone()];
    let pool = BackendPool::new(backends, Arc::new(FixedSelector(0))).expect("backend pool");

    let pipeline = Pipeline::start_with(&test_config(), pool)
        .await
        .expect("pipeline should start");
    let lifecycle = Lifecycle::new();
    let router = routes::router(AppState::new(&pipeline, lifecycle.clone()));

    TestApp {
        router,
        pipeline,
        lifecycle,
        backend,
    }
}

/// POST / with an optional `location` header and a raw body.
pub async fn post_request(
    router: &Router,
    location: Option<&str>,
    body: &str,
) -> (StatusCode, serde_json::Value) {
    let mut request = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json");
    if let Some(location) = location {
        request = request.header("location", location);
    }
    let request = request.body(Body::from(body.to_string())).unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

pub async fn get_json(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// Poll `condition` every 10ms until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
