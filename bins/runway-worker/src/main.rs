mod config;
mod dispatcher;
mod gateway_link;

use anyhow::Context;
use config::WorkerConfig;
use dispatcher::{CapacityRetry, Dispatcher};
use runway_common::queue::{JobQueue, RedisJobQueue};
use runway_common::remote::RemoteRunner;
use runway_common::store::RedisSubmissionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    runway_common::config::load_dotenv();
    runway_common::telemetry::init("runway-worker");

    let config = WorkerConfig::from_env()?;

    let client = redis::Client::open(config.redis_url.as_str())
        .with_context(|| format!("Invalid REDIS_URL {}", config.redis_url))?;
    let conn = redis::aio::ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;
    info!(queue = %config.queue, "Connected to Redis");

    let queue = RedisJobQueue::new(conn.clone(), config.queue.clone());
    let store = Arc::new(RedisSubmissionStore::new(conn, config.key_prefix.clone()));
    let runner = Arc::new(RemoteRunner::new(&config.executor_url, config.request_timeout)?);
    info!(executor = %config.executor_url, "Using executor");

    let url = gateway_link::worker_url(&config.gateway_url, &config.worker_secret)
        .context("Invalid WS_URL")?;
    let (updates, link) = gateway_link::spawn(url, config.reconnect);

    let dispatcher = Dispatcher::new(store, runner, updates).with_capacity_retry(CapacityRetry {
        attempts: config.capacity_retry_attempts,
        delay: config.capacity_retry_delay,
    });

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                warn!("Received shutdown signal, finishing the current job");
                signal_token.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    worker_loop(&queue, &dispatcher, config.pop_timeout, &shutdown).await;

    // Closing the update channel lets the link flush what is queued
    drop(dispatcher);
    if tokio::time::timeout(Duration::from_secs(2), link).await.is_err() {
        warn!("Gateway link did not drain in time");
    }

    info!("Worker shutdown complete");
    Ok(())
}

/// Pop and dispatch until `shutdown` fires.
///
/// Shutdown is only observed between pops. A popped job is already gone from
/// the queue, so it always runs through to its terminal write.
#[instrument(skip_all)]
async fn worker_loop(
    queue: &dyn JobQueue,
    dispatcher: &Dispatcher,
    pop_timeout: Duration,
    shutdown: &CancellationToken,
) {
    while !shutdown.is_cancelled() {
        match queue.pop(pop_timeout).await {
            Ok(Some(delivery)) => {
                let outcome = dispatcher.handle(delivery).await;
                info!(outcome = ?outcome, "Job handled");
            }
            Ok(None) => continue,
            Err(e) => {
                error!(error = %e, "Queue error");
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
            }
        }
    }
    info!("Worker loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use runway_common::messages::ResultEvent;
    use runway_common::queue::MemoryJobQueue;
    use runway_common::runner::CodeRunner;
    use runway_common::store::{MemorySubmissionStore, SubmissionStore};
    use runway_common::types::{ExecutionOutput, JobRecord, NewSubmission, SubmissionStatus};
    use runway_common::{Language, RunwayError};
    use tokio::sync::mpsc;

    struct EchoRunner;

    #[async_trait]
    impl CodeRunner for EchoRunner {
        async fn execute(&self, _language: Language, code: &str) -> Result<ExecutionOutput, RunwayError> {
            Ok(ExecutionOutput {
                output: code.to_string(),
                exit_status: Some(0),
                elapsed: Duration::from_millis(1),
            })
        }
    }

    #[tokio::test]
    async fn test_loop_drains_queue_in_order_and_survives_bad_entries() {
        let store = Arc::new(MemorySubmissionStore::new());
        let queue = MemoryJobQueue::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<ResultEvent>();
        let dispatcher = Dispatcher::new(store.clone(), Arc::new(EchoRunner), tx);

        let mut ids = Vec::new();
        for code in ["first", "second"] {
            let submission = store
                .create(NewSubmission {
                    code: code.into(),
                    language: Language::Python,
                    user_id: "u1".into(),
                })
                .await
                .unwrap();
            ids.push(submission.id.clone());
            queue.push(&JobRecord::for_submission(&submission)).await.unwrap();
            queue.push_raw("garbage").await;
        }

        let shutdown = CancellationToken::new();
        let _ = tokio::time::timeout(
            Duration::from_millis(200),
            worker_loop(&queue, &dispatcher, Duration::from_millis(10), &shutdown),
        )
        .await;

        assert!(queue.is_empty().await);
        for id in &ids {
            let stored = store.get(id).await.unwrap().unwrap();
            assert_eq!(stored.status, SubmissionStatus::Completed);
        }
        let results: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.result)
            .collect();
        assert_eq!(results, vec!["Executing Code", "first", "Executing Code", "second"]);
    }

    struct SlowRunner(Duration);

    #[async_trait]
    impl CodeRunner for SlowRunner {
        async fn execute(&self, _language: Language, code: &str) -> Result<ExecutionOutput, RunwayError> {
            tokio::time::sleep(self.0).await;
            Ok(ExecutionOutput {
                output: code.to_string(),
                exit_status: Some(0),
                elapsed: self.0,
            })
        }
    }

    #[tokio::test]
    async fn test_shutdown_lets_running_job_finish() {
        let store = Arc::new(MemorySubmissionStore::new());
        let queue = MemoryJobQueue::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<ResultEvent>();
        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::new(SlowRunner(Duration::from_millis(500))),
            tx,
        );

        let mut ids = Vec::new();
        for code in ["running", "waiting"] {
            let submission = store
                .create(NewSubmission {
                    code: code.into(),
                    language: Language::Python,
                    user_id: "u1".into(),
                })
                .await
                .unwrap();
            ids.push(submission.id.clone());
            queue.push(&JobRecord::for_submission(&submission)).await.unwrap();
        }

        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        tokio::time::timeout(
            Duration::from_secs(5),
            worker_loop(&queue, &dispatcher, Duration::from_millis(10), &shutdown),
        )
        .await
        .expect("worker loop did not stop after shutdown");

        let running = store.get(&ids[0]).await.unwrap().unwrap();
        assert_eq!(running.status, SubmissionStatus::Completed);
        assert_eq!(running.result.as_deref(), Some("running"));

        // The second job was never popped and is still queued for the next worker
        let waiting = store.get(&ids[1]).await.unwrap().unwrap();
        assert_eq!(waiting.status, SubmissionStatus::Pending);
        assert_eq!(queue.len().await, 1);

        let results: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.result)
            .collect();
        assert_eq!(results, vec!["Executing Code", "running"]);
    }
}
