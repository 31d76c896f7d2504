use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::{AsyncCommands, Direction};

use crate::services::queue::QueueError;

/// Backing store for one named queue.
///
/// Payloads are opaque serialized strings. A reserved payload stays in the
/// store (in-flight) until it is acked, so a crash between `reserve` and
/// `ack` leaves it recoverable.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append a payload at the tail. Returns once the write is committed.
    async fn push(&self, payload: &str) -> Result<(), QueueError>;

    /// Move the oldest pending payload to in-flight and return it.
    async fn reserve(&self) -> Result<Option<String>, QueueError>;

    /// Remove a finished payload from in-flight.
    async fn ack(&self, payload: &str) -> Result<(), QueueError>;

    /// Pending plus in-flight payloads.
    async fn len(&self) -> Result<u64, QueueError>;

    /// Put payloads left in-flight by a previous run back at the head of the
    /// pending list. Returns how many were moved.
    async fn recover(&self) -> Result<u64, QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryLists>,
}

#[derive(Default)]
struct MemoryLists {
    pending: VecDeque<String>,
    in_flight: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn push(&self, payload: &str) -> Result<(), QueueError> {
        self.inner.lock().pending.push_back(payload.to_string());
        Ok(())
    }

    async fn reserve(&self) -> Result<Option<String>, QueueError> {
        let mut lists = self.inner.lock();
        let next = lists.pending.pop_front();
        if let Some(payload) = &next {
            lists.in_flight.push(payload.clone());
        }
        Ok(next)
    }

    async fn ack(&self, payload: &str) -> Result<(), QueueError> {
        let mut lists = self.inner.lock();
        if let Some(pos) = lists.in_flight.iter().position(|p| p == payload) {
            lists.in_flight.remove(pos);
        }
        Ok(())
    }

    async fn len(&self) -> Result<u64, QueueError> {
        let lists = self.inner.lock();
        Ok((lists.pending.len() + lists.in_flight.len()) as u64)
    }

    async fn recover(&self) -> Result<u64, QueueError> {
        let mut lists = self.inner.lock();
        let moved = lists.in_flight.len() as u64;
        // Newest in-flight first so the oldest ends up at the very front.
        while let Some(payload) = lists.in_flight.pop() {
            lists.pending.push_front(payload);
        }
        Ok(moved)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

/// Redis-backed store: a pending list and an in-flight list per queue name.
///
/// Producers LPUSH onto `<prefix>:<queue>:jobs`; the consumer RPOPLPUSHes
/// into `<prefix>:<queue>:processing`, so the right end of the jobs list is
/// always the oldest job.
pub struct RedisStore {
    client: redis::Client,
    jobs_key: String,
    processing_key: String,
}

impl RedisStore {
    pub fn new(redis_url: &str, prefix: &str, queue_name: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self::with_client(client, prefix, queue_name))
    }

    pub fn with_client(client: redis::Client, prefix: &str, queue_name: &str) -> Self {
        Self {
            client,
            jobs_key: format!("{prefix}:{queue_name}:jobs"),
            processing_key: format!("{prefix}:{queue_name}:processing"),
        }
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }
}

#[async_trait]
impl QueueStore for RedisStore {
    async fn push(&self, payload: &str) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        conn.lpush::<_, _, ()>(&self.jobs_key, payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn reserve(&self) -> Result<Option<String>, QueueError> {
        let mut conn = self.connection().await?;
        let result: Option<String> = conn
            .rpoplpush(&self.jobs_key, &self.processing_key)
            .await
            .map_err(QueueError::Redis)?;
        Ok(result)
    }

    async fn ack(&self, payload: &str) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        conn.lrem::<_, _, ()>(&self.processing_key, 1, payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn len(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let pending: u64 = conn.llen(&self.jobs_key).await.map_err(QueueError::Redis)?;
        let in_flight: u64 = conn
            .llen(&self.processing_key)
            .await
            .map_err(QueueError::Redis)?;
        Ok(pending + in_flight)
    }

    async fn recover(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let mut moved = 0;
        // One LMOVE per entry, so a payload is always in exactly one list.
        // The most recently reserved entry goes first and lands on the
        // consuming end, so the oldest in-flight job is delivered first.
        loop {
            let payload: Option<String> = conn
                .lmove(
                    &self.processing_key,
                    &self.jobs_key,
                    Direction::Left,
                    Direction::Right,
                )
                .await
                .map_err(QueueError::Redis)?;
            if payload.is_none() {
                break;
            }
            moved += 1;
        }
        Ok(moved)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}
