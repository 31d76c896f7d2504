mod helpers;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use tokio::sync::{Notify, Semaphore};

use geo_dispatch::{
    app_state::AppState,
    models::job::{Job, RoutedJob},
    routes,
    services::{
        backend::{BackendApi, BackendPool, FixedSelector},
        dispatcher::{Dispatcher, Route},
        lifecycle::{DrainSettings, Lifecycle, LifecycleState},
        queue::{JobQueue, ManagedQueue, QueueError, QueueOptions},
        store::{MemoryStore, QueueStore},
        trace_log::TraceLog,
        worker::RegionalWorker,
    },
};

use helpers::{post_request, wait_until, RecordingBackend};

const RESOURCE: &str = r#"{"method":"GET","url":"/api/v1/resource"}"#;

/// Memory store whose `push` waits for an explicit release.
struct GatedStore {
    inner: MemoryStore,
    entered: Notify,
    release: Semaphore,
}

impl GatedStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            entered: Notify::new(),
            release: Semaphore::new(0),
        }
    }
}

#[async_trait]
impl QueueStore for GatedStore {
    async fn push(&self, payload: &str) -> Result<(), QueueError> {
        self.entered.notify_one();
        if let Ok(permit) = self.release.acquire().await {
            permit.forget();
        }
        self.inner.push(payload).await
    }

    async fn reserve(&self) -> Result<Option<String>, QueueError> {
        self.inner.reserve().await
    }

    async fn ack(&self, payload: &str) -> Result<(), QueueError> {
        self.inner.ack(payload).await
    }

    async fn len(&self) -> Result<u64, QueueError> {
        self.inner.len().await
    }

    async fn recover(&self) -> Result<u64, QueueError> {
        self.inner.recover().await
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        self.inner.health_check().await
    }
}

fn fast() -> QueueOptions {
    QueueOptions {
        concurrency: 1,
        poll_interval: Duration::from_millis(20),
    }
}

/// A request whose commit is still in flight when the signal arrives gets
/// its 202 and its backend call, and the drain waits for both.
#[tokio::test]
async fn test_request_admitted_before_shutdown_is_delivered() {
    let backend = Arc::new(RecordingBackend::default());
    let backends: Vec<Arc<dyn BackendApi>> = vec![backend.clone()];
    let pool = BackendPool::new(backends, Arc::new(FixedSelector(0))).unwrap();

    let usa: Arc<JobQueue<RoutedJob>> =
        JobQueue::open("usaQueue", Arc::new(MemoryStore::new()), fast())
            .await
            .unwrap();
    usa.process(RegionalWorker::new("usaQueue", pool)).unwrap();

    let intake_store = Arc::new(GatedStore::new());
    let trace = Arc::new(TraceLog::new(100));
    let main: Arc<JobQueue<Job>> = JobQueue::open("mainQueue", intake_store.clone(), fast())
        .await
        .unwrap();
    let regions = vec![Route {
        tag: "USA".into(),
        queue: Arc::clone(&usa),
    }];
    main.process(Dispatcher::new(regions, Arc::clone(&trace)))
        .unwrap();

    let lifecycle = Lifecycle::new();
    let queues: Vec<Arc<dyn ManagedQueue>> = vec![main.clone(), usa.clone()];
    let router = routes::router(AppState {
        main_queue: main.clone(),
        queues: queues.clone().into(),
        trace,
        lifecycle: lifecycle.clone(),
    });

    let request = {
        let router = router.clone();
        tokio::spawn(async move { post_request(&router, Some("USA"), RESOURCE).await })
    };
    intake_store.entered.notified().await;

    let shutdown = {
        let lifecycle = lifecycle.clone();
        let queues = queues.clone();
        tokio::spawn(async move {
            lifecycle
                .shutdown(
                    &queues,
                    DrainSettings {
                        timeout: Duration::from_secs(5),
                        stall: Duration::from_secs(2),
                    },
                )
                .await
        })
    };
    assert!(
        wait_until(Duration::from_secs(1), || lifecycle.state() == LifecycleState::Draining)
            .await
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!shutdown.is_finished());

    intake_store.release.add_permits(1);

    let (status, _) = request.await.unwrap();
    assert_eq!(status, StatusCode::ACCEPTED);
    let result = shutdown.await.unwrap();
    assert!(result.is_ok(), "{result:?}");

    assert_eq!(main.size(), 0);
    assert_eq!(usa.size(), 0);
    assert_eq!(backend.calls.lock().len(), 1);

    let (status, _) = post_request(&router, Some("USA"), RESOURCE).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
