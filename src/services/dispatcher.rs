use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::models::job::{Job, RoutedJob};
use crate::services::queue::{JobError, JobHandler, JobQueue};
use crate::services::trace_log::{TraceEntry, TraceLog};

/// Regional queue serving one location tag.
pub struct Route {
    pub tag: String,
    pub queue: Arc<JobQueue<RoutedJob>>,
}

/// Where a main-queue job ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Routed { queue: String },
    /// The location named no configured region; the job was dropped.
    Unroutable { location: String },
}

/// Main-queue handler: fans each job out to exactly one regional queue.
pub struct Dispatcher {
    routes: Vec<Route>,
    trace: Arc<TraceLog>,
}

impl Dispatcher {
    pub fn new(routes: Vec<Route>, trace: Arc<TraceLog>) -> Self {
        Self { routes, trace }
    }

    pub async fn dispatch(&self, job: Job) -> Result<DispatchOutcome, JobError> {
        let Some(route) = self.routes.iter().find(|r| r.tag == job.location) else {
            warn!(
                condition = "UnroutableLocation",
                job_id = %job.id,
                location = %job.location,
                "UnroutableLocation: no region for location, dropping job"
            );
            metrics::counter!("dispatch_unroutable_total").increment(1);
            return Ok(DispatchOutcome::Unroutable {
                location: job.location,
            });
        };

        let routed = job.clone().into_routed();
        route
            .queue
            .add_then(&routed, || {
                self.trace.record(TraceEntry::new(route.queue.name(), &job))
            })
            .await?;

        info!(
            job_id = %job.id,
            location = %job.location,
            queue = %route.queue.name(),
            "Job routed to regional queue"
        );
        Ok(DispatchOutcome::Routed {
            queue: route.queue.name().to_string(),
        })
    }
}

#[async_trait]
impl JobHandler<Job> for Dispatcher {
    async fn handle(&self, job: Job) -> Result<(), JobError> {
        self.dispatch(job).await.map(|_| ())
    }
}
