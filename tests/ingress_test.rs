mod helpers;

use std::sync::Arc;

use axum::http::StatusCode;
use geo_dispatch::{
    app_state::AppState,
    models::job::Job,
    routes,
    services::{
        lifecycle::Lifecycle,
        queue::{JobQueue, ManagedQueue, QueueOptions},
        store::MemoryStore,
        trace_log::TraceLog,
    },
};

use helpers::{get_json, post_request, spawn_app};

const VALID_BODY: &str = r#"{"method":"GET","url":"/api/v1/resource"}"#;

/// Ingress wired to an intake queue with no handler, so sizes stay put.
async fn intake_only() -> (axum::Router, Arc<JobQueue<Job>>, Arc<TraceLog>, Lifecycle) {
    let main: Arc<JobQueue<Job>> =
        JobQueue::open("mainQueue", Arc::new(MemoryStore::new()), QueueOptions::default())
            .await
            .unwrap();
    let trace = Arc::new(TraceLog::new(100));
    let lifecycle = Lifecycle::new();
    let queues: Vec<Arc<dyn ManagedQueue>> = vec![main.clone()];
    let state = AppState {
        main_queue: main.clone(),
        queues: queues.into(),
        trace: trace.clone(),
        lifecycle: lifecycle.clone(),
    };
    (routes::router(state), main, trace, lifecycle)
}

#[tokio::test]
async fn test_missing_fields_are_rejected() {
    let (router, main, trace, _) = intake_only().await;

    let cases = [
        (None, VALID_BODY),
        (Some("USA"), r#"{"url":"/api/v1/resource"}"#),
        (Some("USA"), r#"{"method":"GET"}"#),
        (Some("USA"), r#"{"method":"","url":"/api/v1/resource"}"#),
        (Some(""), VALID_BODY),
        (Some("USA"), "not json at all"),
        (Some("USA"), ""),
    ];

    for (location, body) in cases {
        let (status, json) = post_request(&router, location, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "location={location:?} body={body}");
        assert_eq!(json["error"], "Invalid request");
    }

    assert_eq!(main.size(), 0);
    assert!(trace.is_empty());
}

#[tokio::test]
async fn test_valid_request_is_queued() {
    let (router, main, trace, _) = intake_only().await;

    let (status, json) = post_request(&router, Some("USA"), VALID_BODY).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["message"], "Request queued for processing");
    assert_eq!(main.size(), 1);

    let (status, _) = post_request(&router, Some("Europe"), VALID_BODY).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(main.size(), 2);

    let entries = trace.snapshot().entries;
    assert_eq!(entries.len(), 2);
    assert!(entries[0]
        .to_string()
        .starts_with("mainQueue queue: GET /api/v1/resource (USA) ["));
}

#[tokio::test]
async fn test_unknown_location_is_still_accepted_at_ingress() {
    let (router, main, _, _) = intake_only().await;
    let (status, _) = post_request(&router, Some("Atlantis"), VALID_BODY).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(main.size(), 1);
}

#[tokio::test]
async fn test_draining_refuses_new_requests() {
    let (router, main, _, lifecycle) = intake_only().await;
    lifecycle.begin_drain();

    let (status, json) = post_request(&router, Some("USA"), VALID_BODY).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "Service unavailable");
    assert_eq!(main.size(), 0);
}

#[tokio::test]
async fn test_queue_sizes_endpoint_lists_every_queue() {
    let app = spawn_app().await;
    let (status, json) = get_json(&app.router, "/queues").await;
    assert_eq!(status, StatusCode::OK);

    let names: Vec<&str> = json["queues"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["queue"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["mainQueue", "usaQueue", "europeQueue", "indiaQueue"]);
    assert_eq!(json["lifecycle"], "running");
}

#[tokio::test]
async fn test_health_reflects_lifecycle() {
    let app = spawn_app().await;
    let (status, json) = get_json(&app.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");

    app.lifecycle.begin_drain();
    let (status, json) = get_json(&app.router, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["lifecycle"], "draining");
}
