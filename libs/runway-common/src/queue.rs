//! Durable job queue abstraction.
//!
//! Production uses Redis (`RedisJobQueue`). `MemoryJobQueue` has the same
//! FIFO and blocking-pop semantics inside one process and backs tests.

use crate::error::RunwayError;
use crate::redis as keys;
use crate::types::{Delivery, JobRecord};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a job at the tail
    async fn push(&self, job: &JobRecord) -> Result<(), RunwayError>;

    /// Take the head entry, waiting at most `timeout`. `Ok(None)` on timeout.
    async fn pop(&self, timeout: Duration) -> Result<Option<Delivery>, RunwayError>;
}

#[derive(Clone)]
pub struct RedisJobQueue {
    conn: ConnectionManager,
    queue: String,
}

impl RedisJobQueue {
    pub fn new(conn: ConnectionManager, queue: impl Into<String>) -> Self {
        Self {
            conn,
            queue: queue.into(),
        }
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn push(&self, job: &JobRecord) -> Result<(), RunwayError> {
        let mut conn = self.conn.clone();
        keys::push_job(&mut conn, &self.queue, job).await
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<Delivery>, RunwayError> {
        let mut conn = self.conn.clone();
        keys::pop_job(&mut conn, &self.queue, timeout.as_secs_f64()).await
    }
}

#[derive(Default)]
pub struct MemoryJobQueue {
    entries: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an arbitrary payload, well-formed or not
    pub async fn push_raw(&self, payload: impl Into<String>) {
        self.entries.lock().await.push_back(payload.into());
        self.notify.notify_one();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn push(&self, job: &JobRecord) -> Result<(), RunwayError> {
        let payload = serde_json::to_string(job)
            .map_err(|e| RunwayError::Queue(format!("serialization error: {}", e)))?;
        self.push_raw(payload).await;
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<Delivery>, RunwayError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(raw) = self.entries.lock().await.pop_front() {
                return Ok(Some(Delivery::parse(&raw)));
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }
}
