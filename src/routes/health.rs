use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;
use crate::services::lifecycle::LifecycleState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub lifecycle: LifecycleState,
    pub queues: Vec<QueueHealth>,
}

#[derive(Serialize)]
pub struct QueueHealth {
    pub name: String,
    pub status: String,
    pub size: u64,
    pub latency_ms: Option<u64>,
}

/// GET /health — lifecycle state plus store connectivity for every queue.
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let mut queues = Vec::with_capacity(state.queues.len());
    for queue in state.queues.iter() {
        let start = std::time::Instant::now();
        let check = match queue.health_check().await {
            Ok(()) => QueueHealth {
                name: queue.name().to_string(),
                status: "ok".to_string(),
                size: queue.size(),
                latency_ms: Some(start.elapsed().as_millis() as u64),
            },
            Err(_) => QueueHealth {
                name: queue.name().to_string(),
                status: "error".to_string(),
                size: queue.size(),
                latency_ms: None,
            },
        };
        queues.push(check);
    }

    let lifecycle = state.lifecycle.state();
    let all_healthy = lifecycle == LifecycleState::Running && queues.iter().all(|q| q.status == "ok");
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        lifecycle,
        queues,
    };

    (status_code, Json(response))
}
