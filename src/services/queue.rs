use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::models::job::QueuePayload;
use crate::services::backend::BackendError;
use crate::services::store::QueueStore;

/// Per-queue runtime settings.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Jobs handled at once. 1 means strictly sequential.
    pub concurrency: usize,
    /// How often an idle worker re-checks the store for jobs it was not
    /// woken for (e.g. jobs recovered from a durable store).
    pub poll_interval: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            poll_interval: Duration::from_millis(1000),
        }
    }
}

/// Handler driven by a queue's worker, one call per job.
///
/// Returning `Err` marks the job failed; the queue logs it and moves on.
/// There is no retry.
#[async_trait]
pub trait JobHandler<T>: Send + Sync + 'static {
    async fn handle(&self, job: T) -> Result<(), JobError>;
}

/// Named FIFO of jobs over a pluggable [`QueueStore`].
pub struct JobQueue<T> {
    name: String,
    store: Arc<dyn QueueStore>,
    options: QueueOptions,
    /// Pending plus in-flight jobs.
    size: watch::Sender<u64>,
    /// Held across push+increment and across reserve, so a job can never be
    /// finished (and decremented) before its increment is published.
    admission: tokio::sync::Mutex<()>,
    wake: Notify,
    /// One permit per concurrently running handler.
    permits: Arc<Semaphore>,
    draining: AtomicBool,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    _payload: PhantomData<fn() -> T>,
}

impl<T: QueuePayload> JobQueue<T> {
    /// Open a queue over `store`, redelivering anything a previous run left
    /// in flight.
    pub async fn open(
        name: impl Into<String>,
        store: Arc<dyn QueueStore>,
        options: QueueOptions,
    ) -> Result<Arc<Self>, QueueError> {
        let name = name.into();
        let recovered = store.recover().await?;
        if recovered > 0 {
            warn!(queue = %name, recovered, "Redelivering jobs left in flight by a previous run");
        }
        let depth = store.len().await?;
        let (size, _) = watch::channel(depth);
        let (shutdown, _) = watch::channel(false);

        info!(queue = %name, depth, "Queue opened");

        let concurrency = options.concurrency.max(1);
        Ok(Arc::new(Self {
            name,
            store,
            options: QueueOptions {
                concurrency,
                ..options
            },
            size,
            admission: tokio::sync::Mutex::new(()),
            wake: Notify::new(),
            permits: Arc::new(Semaphore::new(concurrency)),
            draining: AtomicBool::new(false),
            shutdown,
            worker: Mutex::new(None),
            _payload: PhantomData,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pending plus in-flight jobs. Never blocks on `add` or the worker.
    pub fn size(&self) -> u64 {
        *self.size.borrow()
    }

    /// Append a job. Returns once the store has committed it; the job is
    /// counted in [`size`](Self::size) from that point on.
    pub async fn add(&self, job: &T) -> Result<(), QueueError> {
        self.add_then(job, || {}).await
    }

    /// Like [`add`](Self::add), running `committed` after the store has the
    /// job and before any worker can reserve it.
    pub async fn add_then<F>(&self, job: &T, committed: F) -> Result<(), QueueError>
    where
        F: FnOnce() + Send,
    {
        if *self.shutdown.borrow() {
            return Err(QueueError::Closed(self.name.clone()));
        }
        let payload = serde_json::to_string(job)?;
        {
            let _admission = self.admission.lock().await;
            self.store.push(&payload).await?;
            self.size.send_modify(|size| *size += 1);
            committed();
        }
        self.wake.notify_one();

        metrics::counter!("dispatch_jobs_enqueued_total", "queue" => self.name.clone()).increment(1);
        debug!(queue = %self.name, job_id = %job.job_id(), "Job added");
        Ok(())
    }

    /// Register the queue's only handler and start its worker.
    pub fn process<H>(self: &Arc<Self>, handler: H) -> Result<(), QueueError>
    where
        H: JobHandler<T>,
    {
        if self.draining.load(Ordering::SeqCst) {
            return Err(QueueError::Draining(self.name.clone()));
        }
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(QueueError::HandlerAlreadyRegistered(self.name.clone()));
        }
        let queue = Arc::clone(self);
        *worker = Some(tokio::spawn(queue.run(Arc::new(handler))));
        Ok(())
    }

    /// Refuse further `process` registrations and wait until every pending
    /// and in-flight job has finished.
    ///
    /// Fails with `Stalled` when the size has not moved for `stall`, which is
    /// how a handler that never completes shows up.
    pub async fn drain(&self, stall: Duration) -> Result<(), QueueError> {
        self.draining.store(true, Ordering::SeqCst);
        let mut size = self.size.subscribe();
        loop {
            let remaining = *size.borrow_and_update();
            if remaining == 0 {
                debug!(queue = %self.name, "Queue drained");
                return Ok(());
            }
            if *self.shutdown.borrow() {
                return Err(QueueError::Closed(self.name.clone()));
            }
            let worker_finished = self.worker.lock().as_ref().map(JoinHandle::is_finished);
            match worker_finished {
                None => {
                    return Err(QueueError::NoHandler {
                        queue: self.name.clone(),
                        remaining,
                    })
                }
                Some(true) => return Err(QueueError::WorkerStopped(self.name.clone())),
                Some(false) => {}
            }
            match tokio::time::timeout(stall, size.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => return Err(QueueError::Closed(self.name.clone())),
                Err(_) => {
                    return Err(QueueError::Stalled {
                        queue: self.name.clone(),
                        remaining,
                    })
                }
            }
        }
    }

    /// Stop the worker loop and wait for jobs already handed to the handler.
    /// Nothing new is reserved.
    ///
    /// Waits as long as the slowest in-flight handler; callers bound it.
    pub async fn close(&self) {
        self.shutdown.send_replace(true);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(queue = %self.name, error = %e, "Queue worker ended abnormally");
            }
        }
        // Every permit back means no handler is running.
        let all = u32::try_from(self.options.concurrency).unwrap_or(u32::MAX);
        let _ = self.permits.acquire_many(all).await;
    }

    pub async fn health_check(&self) -> Result<(), QueueError> {
        self.store.health_check().await
    }

    async fn run<H: JobHandler<T>>(self: Arc<Self>, handler: Arc<H>) {
        let mut shutdown = self.shutdown.subscribe();

        info!(
            queue = %self.name,
            concurrency = self.options.concurrency,
            "Queue worker started"
        );

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            let permit = tokio::select! {
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.changed() => break,
            };

            match self.reserve().await {
                Ok(Some(payload)) => {
                    let queue = Arc::clone(&self);
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        queue.execute(handler, payload).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        _ = tokio::time::sleep(self.options.poll_interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
                Err(e) => {
                    drop(permit);
                    error!(queue = %self.name, error = %e, "Failed to reserve job, will retry");
                    tokio::select! {
                        _ = tokio::time::sleep(self.options.poll_interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }

        info!(queue = %self.name, "Queue worker stopped");
    }

    async fn reserve(&self) -> Result<Option<String>, QueueError> {
        let _admission = self.admission.lock().await;
        self.store.reserve().await
    }

    async fn execute<H: JobHandler<T>>(&self, handler: Arc<H>, payload: String) {
        let job: T = match serde_json::from_str(&payload) {
            Ok(job) => job,
            Err(e) => {
                error!(queue = %self.name, error = %e, "Dropping undecodable job payload");
                self.finish(&payload, false).await;
                return;
            }
        };
        let job_id = job.job_id();

        // Own task, so a panicking handler surfaces as a JoinError here.
        let outcome = tokio::spawn(async move { handler.handle(job).await }).await;

        let succeeded = match outcome {
            Ok(Ok(())) => {
                debug!(queue = %self.name, job_id = %job_id, "Job completed");
                true
            }
            Ok(Err(e)) => {
                error!(queue = %self.name, job_id = %job_id, error = %e, "Job failed");
                false
            }
            Err(e) => {
                error!(queue = %self.name, job_id = %job_id, error = %e, "Job handler panicked");
                false
            }
        };
        self.finish(&payload, succeeded).await;
    }

    async fn finish(&self, payload: &str, succeeded: bool) {
        if let Err(e) = self.store.ack(payload).await {
            error!(
                queue = %self.name,
                error = %e,
                "Failed to ack job; the store will redeliver it after restart"
            );
        }
        self.size.send_modify(|size| *size = size.saturating_sub(1));

        if succeeded {
            metrics::counter!("dispatch_jobs_completed_total", "queue" => self.name.clone())
                .increment(1);
        } else {
            metrics::counter!("dispatch_jobs_failed_total", "queue" => self.name.clone())
                .increment(1);
        }
    }
}

/// Type-erased view of a queue for the reporter and the lifecycle manager.
#[async_trait]
pub trait ManagedQueue: Send + Sync {
    fn name(&self) -> &str;
    fn size(&self) -> u64;
    async fn drain(&self, stall: Duration) -> Result<(), QueueError>;
    async fn close(&self);
    async fn health_check(&self) -> Result<(), QueueError>;
}

#[async_trait]
impl<T: QueuePayload> ManagedQueue for JobQueue<T> {
    fn name(&self) -> &str {
        JobQueue::name(self)
    }

    fn size(&self) -> u64 {
        JobQueue::size(self)
    }

    async fn drain(&self, stall: Duration) -> Result<(), QueueError> {
        JobQueue::drain(self, stall).await
    }

    async fn close(&self) {
        JobQueue::close(self).await
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        JobQueue::health_check(self).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Queue {0} already has a handler")]
    HandlerAlreadyRegistered(String),

    #[error("Queue {0} is draining")]
    Draining(String),

    #[error("Queue {0} is closed")]
    Closed(String),

    #[error("Queue {queue} has {remaining} jobs and no handler")]
    NoHandler { queue: String, remaining: u64 },

    #[error("Queue {0} worker stopped unexpectedly")]
    WorkerStopped(String),

    #[error("Queue {queue} made no progress with {remaining} jobs left")]
    Stalled { queue: String, remaining: u64 },
}

/// Failure reported by a job handler.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Backend call failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Failed to forward job: {0}")]
    Forward(#[from] QueueError),
}
