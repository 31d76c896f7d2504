use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use crate::services::queue::ManagedQueue;
use crate::services::trace_log::{TraceLog, TraceSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSize {
    pub queue: String,
    pub size: u64,
}

/// One observation of the pipeline: sizes first, then the trace replay.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub sizes: Vec<QueueSize>,
    pub trace: TraceSnapshot,
}

/// Periodically logs every queue's size and replays the trace log.
///
/// Reads only. Sizes are read one queue at a time, so a report may mix
/// slightly different instants.
pub struct ObservabilityReporter {
    queues: Vec<Arc<dyn ManagedQueue>>,
    trace: Arc<TraceLog>,
    period: Duration,
}

impl ObservabilityReporter {
    pub fn new(queues: Vec<Arc<dyn ManagedQueue>>, trace: Arc<TraceLog>, period: Duration) -> Self {
        Self {
            queues,
            trace,
            period,
        }
    }

    pub fn sizes(&self) -> Vec<QueueSize> {
        self.queues
            .iter()
            .map(|q| QueueSize {
                queue: q.name().to_string(),
                size: q.size(),
            })
            .collect()
    }

    pub fn snapshot(&self) -> Report {
        Report {
            sizes: self.sizes(),
            trace: self.trace.snapshot(),
        }
    }

    /// Log one report and return it.
    pub fn emit(&self) -> Report {
        let report = self.snapshot();
        for entry in &report.sizes {
            metrics::gauge!("dispatch_queue_depth", "queue" => entry.queue.clone())
                .set(entry.size as f64);
            info!(queue = %entry.queue, size = entry.size, "Queue size");
        }
        if report.trace.evicted > 0 {
            info!(evicted = report.trace.evicted, "Older trace entries rotated out");
        }
        for entry in &report.trace.entries {
            info!(queue = %entry.queue_name, job_id = %entry.job_id, "{entry}");
        }
        report
    }

    /// Emit a report every period until `stop` turns true.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.period);
        // The first tick completes immediately; skip it so the first report
        // comes one full period after startup.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.emit();
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Observability reporter stopped");
    }
}
