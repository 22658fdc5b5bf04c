use crate::metrics;
use async_trait::async_trait;
use runway_common::pool::BackendPool;
use runway_common::remote::RemoteRunner;
use runway_common::runner::CodeRunner;
use runway_common::types::ExecutionOutput;
use runway_common::{Language, RunwayError};
use std::time::Duration;
use tracing::{debug, instrument};

/// Front door over a fixed set of executor backends.
///
/// Each request takes the first free backend for its whole duration. When all
/// are busy the request fails at once with `CapacityExceeded`.
#[derive(Clone)]
pub struct PooledRunner {
    pool: BackendPool,
    client: reqwest::Client,
}

impl PooledRunner {
    pub fn new(pool: BackendPool, request_timeout: Duration) -> Result<Self, RunwayError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RunwayError::SandboxFailure(format!("http client: {}", e)))?;
        Ok(Self { pool, client })
    }
}

#[async_trait]
impl CodeRunner for PooledRunner {
    #[instrument(skip(self, code), fields(language = %language))]
    async fn execute(&self, language: Language, code: &str) -> Result<ExecutionOutput, RunwayError> {
        let lease = self.pool.acquire()?;
        metrics::BACKENDS_BUSY.set(self.pool.busy_count() as i64);
        debug!(backend = lease.address(), "Backend leased");

        // The lease moves into its own task: the backend stays busy until it
        // answers or the backend call times out, even if our caller goes away.
        let pool = self.pool.clone();
        let backend = RemoteRunner::with_client(self.client.clone(), lease.address());
        let code = code.to_string();
        let call = tokio::spawn(async move {
            let outcome = backend.execute(language, &code).await;
            drop(lease);
            metrics::BACKENDS_BUSY.set(pool.busy_count() as i64);
            outcome
        });

        call.await
            .map_err(|e| RunwayError::SandboxFailure(format!("backend call aborted: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_all_busy_fails_fast() {
        let pool = BackendPool::new(["http://127.0.0.1:9"]);
        let runner = PooledRunner::new(pool.clone(), Duration::from_secs(1)).unwrap();
        let _held = pool.acquire().unwrap();

        let err = runner.execute(Language::Python, "print(1)").await.unwrap_err();
        assert_eq!(err, RunwayError::CapacityExceeded);
    }

    #[tokio::test]
    async fn test_backend_released_after_transport_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let pool = BackendPool::new([format!("http://{}", addr)]);
        let runner = PooledRunner::new(pool.clone(), Duration::from_secs(1)).unwrap();

        let err = runner.execute(Language::Python, "print(1)").await.unwrap_err();
        assert!(matches!(err, RunwayError::SandboxFailure(_)));
        assert_eq!(pool.busy_count(), 0);
    }

    /// Backend that answers its single request only after `delay`
    async fn slow_backend(delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await.unwrap();
            tokio::time::sleep(delay).await;
            let body = r#"{"success":true,"result":"done","exitStatus":0}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_abandoned_call_keeps_backend_leased() {
        let pool = BackendPool::new([slow_backend(Duration::from_millis(800)).await]);
        let runner = PooledRunner::new(pool.clone(), Duration::from_secs(5)).unwrap();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(200),
            runner.execute(Language::Python, "print(1)"),
        )
        .await;
        assert!(abandoned.is_err());

        assert_eq!(pool.acquire().unwrap_err(), RunwayError::CapacityExceeded);
        assert_eq!(pool.busy_count(), 1);

        let released = tokio::time::timeout(Duration::from_secs(5), async {
            while pool.busy_count() > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(released.is_ok(), "backend never released after it answered");
        assert!(pool.acquire().is_ok());
    }
}
