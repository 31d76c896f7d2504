use std::sync::Arc;

use crate::models::job::Job;
use crate::services::{
    lifecycle::Lifecycle,
    pipeline::Pipeline,
    queue::{JobQueue, ManagedQueue},
    trace_log::TraceLog,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub main_queue: Arc<JobQueue<Job>>,
    /// Every queue, intake first, for health and size reporting.
    pub queues: Arc<[Arc<dyn ManagedQueue>]>,
    pub trace: Arc<TraceLog>,
    pub lifecycle: Lifecycle,
}

impl AppState {
    pub fn new(pipeline: &Pipeline, lifecycle: Lifecycle) -> Self {
        Self {
            main_queue: Arc::clone(&pipeline.main_queue),
            queues: pipeline.queues().into(),
            trace: Arc::clone(&pipeline.trace),
            lifecycle,
        }
    }
}
