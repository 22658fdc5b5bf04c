use crate::error::RunwayError;
use crate::types::{Delivery, JobRecord};
use redis::{AsyncCommands, RedisResult};

/// Redis key semantics - defines only naming and the raw queue operations.
/// API, worker and store never drift because every key is built here.

pub const DEFAULT_PREFIX: &str = "runway";
pub const DEFAULT_QUEUE: &str = "runway:queue:submissions";

/// Key of the hash holding one submission
pub fn submission_key(prefix: &str, submission_id: &str) -> String {
    format!("{}:submission:{}", prefix, submission_id)
}

/// Push a job onto the queue.
/// LPUSH here and BRPOP in `pop_job` give FIFO order.
pub async fn push_job(
    conn: &mut redis::aio::ConnectionManager,
    queue: &str,
    job: &JobRecord,
) -> Result<(), RunwayError> {
    let payload = serde_json::to_string(job)
        .map_err(|e| RunwayError::Queue(format!("serialization error: {}", e)))?;
    push_raw(conn, queue, &payload).await
}

/// Push an already-encoded entry; used to requeue and by tooling
pub async fn push_raw(
    conn: &mut redis::aio::ConnectionManager,
    queue: &str,
    payload: &str,
) -> Result<(), RunwayError> {
    let result: RedisResult<i64> = conn.lpush(queue, payload).await;
    result
        .map(|_| ())
        .map_err(|e| RunwayError::Queue(e.to_string()))
}

/// Pop the oldest job, blocking for at most `timeout_seconds`.
/// A bounded block lets the worker loop observe shutdown between pops.
pub async fn pop_job(
    conn: &mut redis::aio::ConnectionManager,
    queue: &str,
    timeout_seconds: f64,
) -> Result<Option<Delivery>, RunwayError> {
    let result: RedisResult<Option<(String, String)>> = conn.brpop(queue, timeout_seconds).await;

    match result {
        Ok(Some((_key, payload))) => Ok(Some(Delivery::parse(&payload))),
        Ok(None) => Ok(None),
        Err(e) => Err(RunwayError::Queue(e.to_string())),
    }
}
