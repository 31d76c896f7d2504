use serde::Deserialize;
use strum::{Display, EnumString};

use crate::services::regions::RegionTable;

/// Which backing store the queues use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QueueBackendKind {
    Memory,
    Redis,
}

/// How regional workers reach the backend API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackendMode {
    /// In-process calls with a simulated latency envelope.
    Simulated,
    /// Real outbound HTTP calls to `backend_urls`.
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Queue backing store
    #[serde(default = "default_queue_backend")]
    pub queue_backend: QueueBackendKind,

    /// Redis connection string, required when `queue_backend` is redis
    pub redis_url: Option<String>,

    /// Key prefix for queue stores
    #[serde(default = "default_queue_prefix")]
    pub queue_prefix: String,

    /// Name of the intake queue
    #[serde(default = "default_main_queue")]
    pub main_queue: String,

    /// Region table, `TAG=queueName` pairs separated by commas
    #[serde(default = "default_regions")]
    pub regions: String,

    /// Jobs processed at once per queue
    #[serde(default = "default_concurrency")]
    pub queue_concurrency: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,

    /// Upper bound on the whole shutdown drain
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    /// A queue whose size does not move for this long is considered stuck
    #[serde(default = "default_drain_stall_secs")]
    pub drain_stall_secs: u64,

    /// Trace log entries kept before the oldest are rotated out
    #[serde(default = "default_trace_capacity")]
    pub trace_capacity: usize,

    #[serde(default = "default_backend_mode")]
    pub backend_mode: BackendMode,

    /// Comma-separated base URLs, one per backend variant (http mode)
    #[serde(default)]
    pub backend_urls: String,

    /// Probability that a simulated backend call fails
    #[serde(default)]
    pub backend_failure_rate: f64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_queue_backend() -> QueueBackendKind {
    QueueBackendKind::Memory
}

fn default_queue_prefix() -> String {
    "geo_dispatch".to_string()
}

fn default_main_queue() -> String {
    "mainQueue".to_string()
}

fn default_regions() -> String {
    "USA=usaQueue,Europe=europeQueue,India=indiaQueue".to_string()
}

fn default_concurrency() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_report_interval_secs() -> u64 {
    10
}

fn default_drain_timeout_secs() -> u64 {
    30
}

fn default_drain_stall_secs() -> u64 {
    10
}

fn default_trace_capacity() -> usize {
    10_000
}

fn default_backend_mode() -> BackendMode {
    BackendMode::Simulated
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.check()?;
        Ok(config)
    }

    /// Cross-field checks envy cannot express.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.queue_backend == QueueBackendKind::Redis && self.redis_url.is_none() {
            return Err(ConfigError::Missing("REDIS_URL"));
        }
        if self.backend_mode == BackendMode::Http && self.backend_url_list().is_empty() {
            return Err(ConfigError::Missing("BACKEND_URLS"));
        }
        if self.queue_concurrency == 0 {
            return Err(ConfigError::Invalid("QUEUE_CONCURRENCY must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.backend_failure_rate) {
            return Err(ConfigError::Invalid(
                "BACKEND_FAILURE_RATE must be between 0 and 1".into(),
            ));
        }
        if self.main_queue.trim().is_empty() {
            return Err(ConfigError::Invalid("MAIN_QUEUE must not be empty".into()));
        }
        let regions = self.region_table()?;
        if regions.iter().any(|r| r.queue_name == self.main_queue) {
            return Err(ConfigError::Invalid(format!(
                "MAIN_QUEUE {} is also used as a regional queue",
                self.main_queue
            )));
        }
        Ok(())
    }

    pub fn region_table(&self) -> Result<RegionTable, ConfigError> {
        RegionTable::parse(&self.regions).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn backend_url_list(&self) -> Vec<String> {
        self.backend_urls
            .split(',')
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(|u| u.trim_end_matches('/').to_string())
            .collect()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            queue_backend: default_queue_backend(),
            redis_url: None,
            queue_prefix: default_queue_prefix(),
            main_queue: default_main_queue(),
            regions: default_regions(),
            queue_concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
            report_interval_secs: default_report_interval_secs(),
            drain_timeout_secs: default_drain_timeout_secs(),
            drain_stall_secs: default_drain_stall_secs(),
            trace_capacity: default_trace_capacity(),
            backend_mode: default_backend_mode(),
            backend_urls: String::new(),
            backend_failure_rate: 0.0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}
