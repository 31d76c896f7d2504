use async_trait::async_trait;
use tracing::info;

use crate::models::job::RoutedJob;
use crate::services::backend::BackendPool;
use crate::services::queue::{JobError, JobHandler};

/// Regional-queue handler: one backend call per job, fire-and-forget.
///
/// A failed call is returned to the queue runtime, which logs it with the
/// queue name and job id and marks the job done. There is no retry.
pub struct RegionalWorker {
    queue_name: String,
    backends: BackendPool,
}

impl RegionalWorker {
    pub fn new(queue_name: impl Into<String>, backends: BackendPool) -> Self {
        Self {
            queue_name: queue_name.into(),
            backends,
        }
    }
}

#[async_trait]
impl JobHandler<RoutedJob> for RegionalWorker {
    async fn handle(&self, job: RoutedJob) -> Result<(), JobError> {
        let backend = self.backends.choose();
        let response = backend.call(&job.method, &job.url).await?;

        info!(
            queue = %self.queue_name,
            job_id = %job.id,
            backend = %response.backend,
            status = response.status,
            latency_ms = response.latency.as_millis() as u64,
            "Backend call completed"
        );
        Ok(())
    }
}
