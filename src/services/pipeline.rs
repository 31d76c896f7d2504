use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{AppConfig, BackendMode, ConfigError, QueueBackendKind};
use crate::models::job::{Job, RoutedJob};
use crate::services::backend::{
    BackendApi, BackendError, BackendPool, HttpBackend, SimulatedBackend, UniformSelector,
};
use crate::services::dispatcher::{Dispatcher, Route};
use crate::services::queue::{JobQueue, ManagedQueue, QueueError, QueueOptions};
use crate::services::store::{MemoryStore, QueueStore, RedisStore};
use crate::services::trace_log::TraceLog;
use crate::services::worker::RegionalWorker;

/// The running queue topology: intake queue, one queue per region, and the
/// trace log they share.
pub struct Pipeline {
    pub main_queue: Arc<JobQueue<Job>>,
    pub regional: Vec<Arc<JobQueue<RoutedJob>>>,
    pub trace: Arc<TraceLog>,
}

impl Pipeline {
    /// Open every queue and start its worker, with backends from `config`.
    pub async fn start(config: &AppConfig) -> Result<Self, PipelineError> {
        let backends = backend_pool(config)?;
        Self::start_with(config, backends).await
    }

    /// Same as [`start`](Self::start) with an explicit backend pool.
    pub async fn start_with(config: &AppConfig, backends: BackendPool) -> Result<Self, PipelineError> {
        let regions = config.region_table()?;
        let options = QueueOptions {
            concurrency: config.queue_concurrency,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        };
        let redis = match config.queue_backend {
            QueueBackendKind::Memory => None,
            QueueBackendKind::Redis => {
                let url = config
                    .redis_url
                    .as_deref()
                    .ok_or(ConfigError::Missing("REDIS_URL"))?;
                Some(redis::Client::open(url).map_err(QueueError::Redis)?)
            }
        };
        let open_store = |name: &str| -> Arc<dyn QueueStore> {
            match &redis {
                Some(client) => Arc::new(RedisStore::with_client(
                    client.clone(),
                    &config.queue_prefix,
                    name,
                )),
                None => Arc::new(MemoryStore::new()),
            }
        };

        let trace = Arc::new(TraceLog::new(config.trace_capacity));

        let mut regional = Vec::with_capacity(regions.len());
        let mut routes = Vec::with_capacity(regions.len());
        for region in regions.iter() {
            let queue: Arc<JobQueue<RoutedJob>> =
                JobQueue::open(&region.queue_name, open_store(&region.queue_name), options.clone())
                    .await?;
            queue.process(RegionalWorker::new(&region.queue_name, backends.clone()))?;
            routes.push(Route {
                tag: region.tag.clone(),
                queue: Arc::clone(&queue),
            });
            regional.push(queue);
        }

        let main_queue: Arc<JobQueue<Job>> =
            JobQueue::open(&config.main_queue, open_store(&config.main_queue), options).await?;
        main_queue.process(Dispatcher::new(routes, Arc::clone(&trace)))?;

        info!(
            backend = %config.queue_backend,
            main_queue = %config.main_queue,
            regions = regions.len(),
            "Dispatch pipeline started"
        );

        Ok(Self {
            main_queue,
            regional,
            trace,
        })
    }

    /// Every queue, intake first.
    pub fn queues(&self) -> Vec<Arc<dyn ManagedQueue>> {
        let mut queues: Vec<Arc<dyn ManagedQueue>> = Vec::with_capacity(self.regional.len() + 1);
        queues.push(self.main_queue.clone());
        for queue in &self.regional {
            queues.push(queue.clone());
        }
        queues
    }
}

/// Backend variants for the configured mode, chosen uniformly at random.
pub fn backend_pool(config: &AppConfig) -> Result<BackendPool, BackendError> {
    let backends: Vec<Arc<dyn BackendApi>> = match config.backend_mode {
        BackendMode::Simulated => SimulatedBackend::defaults(config.backend_failure_rate),
        BackendMode::Http => config
            .backend_url_list()
            .into_iter()
            .enumerate()
            .map(|(i, url)| {
                HttpBackend::new(format!("api{}", i + 1), url)
                    .map(|backend| Arc::new(backend) as Arc<dyn BackendApi>)
            })
            .collect::<Result<_, _>>()?,
    };
    BackendPool::new(backends, Arc::new(UniformSelector))
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}
