use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;
use crate::services::lifecycle::LifecycleState;
use crate::services::reporter::QueueSize;

#[derive(Serialize)]
pub struct QueuesResponse {
    pub lifecycle: LifecycleState,
    pub queues: Vec<QueueSize>,
    pub trace_entries: usize,
}

/// GET /queues — current size of every queue.
pub async fn queue_sizes(State(state): State<AppState>) -> Json<QueuesResponse> {
    Json(QueuesResponse {
        lifecycle: state.lifecycle.state(),
        queues: state
            .queues
            .iter()
            .map(|q| QueueSize {
                queue: q.name().to_string(),
                size: q.size(),
            })
            .collect(),
        trace_entries: state.trace.len(),
    })
}
