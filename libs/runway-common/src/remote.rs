//! HTTP client for an executor's `POST /execute`.
//!
//! The body is decoded whatever the status code: the executor reports every
//! outcome, including busy and timed out, as an `ExecuteResponse`.

use crate::error::RunwayError;
use crate::language::Language;
use crate::runner::CodeRunner;
use crate::types::{ExecuteRequest, ExecuteResponse, ExecutionOutput};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

const BACKEND_GRACE: Duration = Duration::from_secs(30);
const CALLER_GRACE: Duration = Duration::from_secs(15);

/// HTTP budget for one call to a sandbox backend running with `deadline`
pub fn backend_timeout(deadline: Duration) -> Duration {
    deadline + BACKEND_GRACE
}

/// HTTP budget for a caller of the executor front door.
///
/// Strictly longer than `backend_timeout`, so a caller never gives up on a
/// backend call the front door is still waiting for.
pub fn caller_timeout(deadline: Duration) -> Duration {
    backend_timeout(deadline) + CALLER_GRACE
}

#[derive(Clone, Debug)]
pub struct RemoteRunner {
    client: reqwest::Client,
    endpoint: String,
}

impl RemoteRunner {
    /// `base_url` is the executor root, e.g. `http://executor:8081`
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, RunwayError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RunwayError::SandboxFailure(format!("http client: {}", e)))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/execute", base_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Forward an already-formed request body unchanged
    pub async fn forward(&self, request: &ExecuteRequest) -> Result<ExecuteResponse, RunwayError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| RunwayError::SandboxFailure(format!("executor unreachable: {}", e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| RunwayError::SandboxFailure(format!("executor response: {}", e)))?;

        decode_response(status, &body)
    }
}

#[async_trait]
impl CodeRunner for RemoteRunner {
    async fn execute(
        &self,
        language: Language,
        code: &str,
    ) -> Result<ExecutionOutput, RunwayError> {
        self.forward(&ExecuteRequest::new(language, code))
            .await?
            .into_result()
    }
}

fn decode_response(status: StatusCode, body: &[u8]) -> Result<ExecuteResponse, RunwayError> {
    match serde_json::from_slice::<ExecuteResponse>(body) {
        Ok(parsed) => Ok(parsed),
        Err(_) if status == StatusCode::SERVICE_UNAVAILABLE => Err(RunwayError::CapacityExceeded),
        Err(e) => Err(RunwayError::SandboxFailure(format!(
            "executor returned {} with unreadable body: {}",
            status, e
        ))),
    }
}
