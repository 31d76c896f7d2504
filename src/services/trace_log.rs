use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::models::job::{Job, JobId};

/// A job being admitted to a queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    pub queue_name: String,
    pub job_id: JobId,
    pub method: String,
    pub url: String,
    pub location: String,
    pub recorded_at: DateTime<Utc>,
}

impl TraceEntry {
    pub fn new(queue_name: impl Into<String>, job: &Job) -> Self {
        Self {
            queue_name: queue_name.into(),
            job_id: job.id,
            method: job.method.clone(),
            url: job.url.clone(),
            location: job.location.clone(),
            recorded_at: Utc::now(),
        }
    }
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} queue: {} {} ({}) [{}]",
            self.queue_name, self.method, self.url, self.location, self.job_id
        )
    }
}

/// Append-only, bounded record of queue admissions.
///
/// Once `capacity` is reached the oldest entry is rotated out for every new
/// one; `evicted` counts how many were lost that way.
pub struct TraceLog {
    capacity: usize,
    inner: Mutex<TraceRing>,
}

#[derive(Default)]
struct TraceRing {
    entries: VecDeque<TraceEntry>,
    evicted: u64,
}

/// Copy of the log taken for reporting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TraceSnapshot {
    pub entries: Vec<TraceEntry>,
    pub evicted: u64,
}

impl TraceLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(TraceRing::default()),
        }
    }

    pub fn record(&self, entry: TraceEntry) {
        let mut ring = self.inner.lock();
        if ring.entries.len() == self.capacity {
            ring.entries.pop_front();
            ring.evicted += 1;
        }
        ring.entries.push_back(entry);
    }

    pub fn snapshot(&self) -> TraceSnapshot {
        let ring = self.inner.lock();
        TraceSnapshot {
            entries: ring.entries.iter().cloned().collect(),
            evicted: ring.evicted,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
