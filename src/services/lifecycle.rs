use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use strum::Display;
use tokio::sync::{watch, RwLock, RwLockReadGuard};
use tracing::{debug, error, info, warn};

use crate::services::queue::{ManagedQueue, QueueError};

/// `Running -> Draining -> Stopped`, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LifecycleState {
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
pub struct DrainSettings {
    /// Bound on the whole drain.
    pub timeout: Duration,
    /// Bound on a single queue making no progress.
    pub stall: Duration,
}

/// Owns the process lifecycle state. Cheap to clone; all clones share it.
#[derive(Clone)]
pub struct Lifecycle {
    state: Arc<watch::Sender<LifecycleState>>,
    /// Read side held by each request being admitted; shutdown takes the
    /// write side once draining has begun.
    admission: Arc<RwLock<()>>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Running);
        Self {
            state: Arc::new(state),
            admission: Arc::new(RwLock::new(())),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Whether ingress may admit new requests.
    pub fn is_accepting(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Admit one request, or `None` once draining has begun.
    ///
    /// Hold the guard until the request's job is committed to the intake
    /// queue. Shutdown does not start draining while any guard is alive, so
    /// every job admitted here is seen by the drain.
    pub async fn admit(&self) -> Option<RwLockReadGuard<'_, ()>> {
        let guard = self.admission.read().await;
        self.is_accepting().then_some(guard)
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Resolves once the lifecycle reaches `Stopped`.
    pub async fn stopped(&self) {
        let mut state = self.subscribe();
        let _ = state.wait_for(|s| *s == LifecycleState::Stopped).await;
    }

    /// Move forward to `next`. Returns false if already there or past it.
    fn advance(&self, next: LifecycleState) -> bool {
        self.state.send_if_modified(|state| {
            if *state < next {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    /// Stop admitting work. Idempotent.
    pub fn begin_drain(&self) -> bool {
        let changed = self.advance(LifecycleState::Draining);
        if changed {
            info!(state = %LifecycleState::Draining, "No longer accepting requests");
        }
        changed
    }

    /// Drain every queue, close them and move to `Stopped`.
    ///
    /// `queues` lists the intake queue first. Requests already past
    /// [`admit`](Self::admit) finish committing before draining starts.
    /// Queues are drained concurrently, and draining repeats until all of
    /// them report zero at once, since the intake queue's handler can still
    /// add to a regional queue whose drain already resolved. The intake queue
    /// is closed, with its in-flight handlers finished, before the others.
    pub async fn shutdown(
        &self,
        queues: &[Arc<dyn ManagedQueue>],
        settings: DrainSettings,
    ) -> Result<(), ShutdownError> {
        self.begin_drain();
        info!(
            queues = queues.len(),
            timeout_secs = settings.timeout.as_secs_f64(),
            "Draining queues"
        );

        let drain = async {
            drop(self.admission.write().await);
            debug!("Admitted requests settled");
            drain_all(queues, settings.stall).await
        };
        let mut outcome = match tokio::time::timeout(settings.timeout, drain).await {
            Ok(result) => result,
            Err(_) => Err(ShutdownError::DrainTimeout {
                timeout: settings.timeout,
                remaining: describe_sizes(queues),
            }),
        };

        if let Some((intake, rest)) = queues.split_first() {
            close_within(intake, settings.stall).await;
            join_all(rest.iter().map(|q| close_within(q, settings.stall))).await;
        }
        if outcome.is_ok() && queues.iter().any(|q| q.size() > 0) {
            outcome = Err(ShutdownError::Undrained {
                remaining: describe_sizes(queues),
            });
        }
        self.advance(LifecycleState::Stopped);

        match &outcome {
            Ok(()) => info!(state = %LifecycleState::Stopped, "All queues drained"),
            Err(e) => error!(state = %LifecycleState::Stopped, error = %e, "Shutdown incomplete"),
        }
        outcome
    }
}

async fn drain_all(queues: &[Arc<dyn ManagedQueue>], stall: Duration) -> Result<(), ShutdownError> {
    loop {
        let results = join_all(queues.iter().map(|q| async move {
            (q.name().to_string(), q.drain(stall).await)
        }))
        .await;

        let mut first_failure = None;
        for (queue, result) in results {
            if let Err(e) = result {
                warn!(queue = %queue, error = %e, "Queue failed to drain");
                first_failure.get_or_insert((queue, e));
            }
        }
        if let Some((queue, source)) = first_failure {
            return Err(ShutdownError::DrainFailure { queue, source });
        }

        if queues.iter().all(|q| q.size() == 0) {
            return Ok(());
        }
        debug!("Jobs were forwarded during drain, draining again");
    }
}

async fn close_within(queue: &Arc<dyn ManagedQueue>, limit: Duration) {
    if tokio::time::timeout(limit, queue.close()).await.is_err() {
        warn!(queue = %queue.name(), "Queue did not close in time, abandoning in-flight jobs");
    }
}

fn describe_sizes(queues: &[Arc<dyn ManagedQueue>]) -> String {
    queues
        .iter()
        .filter(|q| q.size() > 0)
        .map(|q| format!("{}={}", q.name(), q.size()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Wait for Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("Drain timed out after {timeout:?}; remaining: {remaining}")]
    DrainTimeout { timeout: Duration, remaining: String },

    #[error("Jobs left after closing queues: {remaining}")]
    Undrained { remaining: String },

    #[error("Queue {queue} failed to drain: {source}")]
    DrainFailure {
        queue: String,
        #[source]
        source: QueueError,
    },
}
