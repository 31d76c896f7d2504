use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub mod health;
pub mod ingress;
pub mod metrics;
pub mod queues;

/// API routes with the standard layers. `/metrics` is added by the binary,
/// since it needs the installed Prometheus recorder.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(ingress::submit_request))
        .route("/health", get(health::health_check))
        .route("/queues", get(queues::queue_sizes))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(64 * 1024))
}
