use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique job token assigned at intake.
///
/// UUIDv7 values are time-ordered and monotonic within the process, so two
/// jobs admitted in the same millisecond still receive distinct, increasing ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Anything a [`JobQueue`](crate::services::queue::JobQueue) can carry.
///
/// The queue needs the job identity for its own logs; everything else about
/// the payload is opaque to it.
pub trait QueuePayload:
    Serialize + serde::de::DeserializeOwned + Send + Sync + 'static
{
    fn job_id(&self) -> JobId;
}

/// A request admitted to the main intake queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub method: String,
    pub url: String,
    pub location: String,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    pub fn new(method: impl Into<String>, url: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            method: method.into(),
            url: url.into(),
            location: location.into(),
            enqueued_at: Utc::now(),
        }
    }

    /// Drop the location once the destination queue encodes it.
    pub fn into_routed(self) -> RoutedJob {
        RoutedJob {
            id: self.id,
            method: self.method,
            url: self.url,
            enqueued_at: self.enqueued_at,
        }
    }
}

impl QueuePayload for Job {
    fn job_id(&self) -> JobId {
        self.id
    }
}

/// A job sitting in a regional queue. The region is implied by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedJob {
    pub id: JobId,
    pub method: String,
    pub url: String,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuePayload for RoutedJob {
    fn job_id(&self) -> JobId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_ids_are_unique_and_ordered() {
        let ids: Vec<JobId> = (0..1000).map(|_| JobId::new()).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_into_routed_keeps_identity() {
        let job = Job::new("GET", "/api/v1/resource", "USA");
        let id = job.id;
        let routed = job.into_routed();
        assert_eq!(routed.id, id);
        assert_eq!(routed.method, "GET");
        assert_eq!(routed.url, "/api/v1/resource");
    }

    #[test]
    fn test_routed_job_serializes_without_location() {
        let routed = Job::new("POST", "/orders", "India").into_routed();
        let value = serde_json::to_value(&routed).unwrap();
        assert!(value.get("location").is_none());
        assert_eq!(value["method"], "POST");
    }
}
