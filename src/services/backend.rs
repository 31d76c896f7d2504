use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, Method};

/// Outcome of a backend call. The body is not forwarded anywhere; only the
/// status is kept for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub backend: String,
    pub status: u16,
    pub latency: Duration,
}

/// Downstream service a regional worker calls on a job's behalf.
#[async_trait]
pub trait BackendApi: Send + Sync {
    fn name(&self) -> &str;

    async fn call(&self, method: &str, url: &str) -> Result<BackendResponse, BackendError>;
}

/// In-process backend that only waits out a uniformly distributed latency.
pub struct SimulatedBackend {
    name: String,
    latency_ms: RangeInclusive<u64>,
    failure_rate: f64,
}

impl SimulatedBackend {
    pub fn new(name: impl Into<String>, latency_ms: RangeInclusive<u64>) -> Self {
        Self {
            name: name.into(),
            latency_ms,
            failure_rate: 0.0,
        }
    }

    /// Make a fraction of calls fail after their latency elapses.
    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate.clamp(0.0, 1.0);
        self
    }

    /// The two stock variants: a slow one (500ms–2.5s) and a fast one (200ms–1.2s).
    pub fn defaults(failure_rate: f64) -> Vec<Arc<dyn BackendApi>> {
        vec![
            Arc::new(Self::new("api1", 500..=2500).with_failure_rate(failure_rate)),
            Arc::new(Self::new("api2", 200..=1200).with_failure_rate(failure_rate)),
        ]
    }
}

#[async_trait]
impl BackendApi for SimulatedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, method: &str, url: &str) -> Result<BackendResponse, BackendError> {
        // Roll before awaiting; the thread-local RNG must not cross an await.
        let (latency, fails) = {
            let mut rng = rand::thread_rng();
            let latency = Duration::from_millis(rng.gen_range(self.latency_ms.clone()));
            (latency, rng.gen_bool(self.failure_rate))
        };
        tokio::time::sleep(latency).await;

        if fails {
            return Err(BackendError::Simulated(format!(
                "{} failed {method} {url}",
                self.name
            )));
        }
        Ok(BackendResponse {
            backend: self.name.clone(),
            status: 200,
            latency,
        })
    }
}

/// Real outbound HTTP backend: `<base_url><url>` with the job's method.
pub struct HttpBackend {
    http: Client,
    name: String,
    base_url: String,
}

impl HttpBackend {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(BackendError::Http)?;
        Ok(Self {
            http,
            name: name.into(),
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, method: &str, url: &str) -> Result<BackendResponse, BackendError> {
        let method = Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|_| BackendError::Method(method.to_string()))?;
        let target = format!("{}{}", self.base_url, url);

        let start = std::time::Instant::now();
        let response = self
            .http
            .request(method, &target)
            .send()
            .await
            .map_err(BackendError::Http)?;
        let latency = start.elapsed();

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                backend: self.name.clone(),
                status: status.as_u16(),
            });
        }
        Ok(BackendResponse {
            backend: self.name.clone(),
            status: status.as_u16(),
            latency,
        })
    }
}

/// Picks which backend variant serves a job.
pub trait BackendSelector: Send + Sync {
    /// Index in `0..count`. `count` is never zero.
    fn select(&self, count: usize) -> usize;
}

/// Uniform random choice among the variants.
#[derive(Debug, Default, Clone, Copy)]
pub struct UniformSelector;

impl BackendSelector for UniformSelector {
    fn select(&self, count: usize) -> usize {
        rand::thread_rng().gen_range(0..count)
    }
}

/// Always the same variant.
#[derive(Debug, Clone, Copy)]
pub struct FixedSelector(pub usize);

impl BackendSelector for FixedSelector {
    fn select(&self, count: usize) -> usize {
        self.0 % count
    }
}

/// The configured backend variants plus the policy choosing between them.
#[derive(Clone)]
pub struct BackendPool {
    backends: Vec<Arc<dyn BackendApi>>,
    selector: Arc<dyn BackendSelector>,
}

impl BackendPool {
    pub fn new(
        backends: Vec<Arc<dyn BackendApi>>,
        selector: Arc<dyn BackendSelector>,
    ) -> Result<Self, BackendError> {
        if backends.is_empty() {
            return Err(BackendError::NoBackends);
        }
        Ok(Self { backends, selector })
    }

    pub fn choose(&self) -> &Arc<dyn BackendApi> {
        let index = self.selector.select(self.backends.len());
        &self.backends[index.min(self.backends.len() - 1)]
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend {backend} returned status {status}")]
    Status { backend: String, status: u16 },

    #[error("Unsupported HTTP method: {0}")]
    Method(String),

    #[error("Simulated failure: {0}")]
    Simulated(String),

    #[error("No backend variants configured")]
    NoBackends,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_latency_within_envelope() {
        let backend = SimulatedBackend::new("api2", 5..=20);
        let response = backend.call("GET", "/x").await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.backend, "api2");
        assert!(response.latency >= Duration::from_millis(5));
        assert!(response.latency <= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_simulated_failure_rate_one_always_fails() {
        let backend = SimulatedBackend::new("api1", 1..=1).with_failure_rate(1.0);
        assert!(matches!(
            backend.call("GET", "/x").await,
            Err(BackendError::Simulated(_))
        ));
    }

    #[test]
    fn test_fixed_selector_is_deterministic() {
        let pool = BackendPool::new(SimulatedBackend::defaults(0.0), Arc::new(FixedSelector(1))).unwrap();
        for _ in 0..10 {
            assert_eq!(pool.choose().name(), "api2");
        }
    }

    #[test]
    fn test_uniform_selector_stays_in_range() {
        let selector = UniformSelector;
        for _ in 0..1000 {
            assert!(selector.select(2) < 2);
        }
    }

    #[test]
    fn test_empty_pool_rejected() {
        assert!(matches!(
            BackendPool::new(Vec::new(), Arc::new(UniformSelector)),
            Err(BackendError::NoBackends)
        ));
    }
}
