//! Per-job orchestration: status writes, sandbox call, user updates.
//!
//! Every update for one submission goes through the same unbounded channel in
//! the order the transitions happen, so the gateway link delivers them in that
//! order too.

use runway_common::messages::{ResultEvent, EXECUTING_CODE};
use runway_common::runner::CodeRunner;
use runway_common::store::{SubmissionStore, Transition};
use runway_common::types::{Delivery, ExecutionOutput, JobRecord, SubmissionStatus};
use runway_common::RunwayError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, instrument, warn};

pub const INVALID_SUBMISSION: &str = "Invalid submission data";
pub const SUBMISSION_NOT_SAVED: &str = "Submission was not saved";
pub const EXECUTION_FAILED: &str = "Failed to Execute Code";
pub const RESULT_NOT_SAVED: &str = "Failed to save result";

/// What happened to one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
    /// Already terminal; nothing ran
    Duplicate,
    /// Malformed payload or unusable submission row
    Dropped,
}

#[derive(Debug, Clone, Copy)]
pub struct CapacityRetry {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for CapacityRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

pub struct Dispatcher {
    store: Arc<dyn SubmissionStore>,
    runner: Arc<dyn CodeRunner>,
    updates: UnboundedSender<ResultEvent>,
    retry: CapacityRetry,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        runner: Arc<dyn CodeRunner>,
        updates: UnboundedSender<ResultEvent>,
    ) -> Self {
        Self {
            store,
            runner,
            updates,
            retry: CapacityRetry::default(),
        }
    }

    pub fn with_capacity_retry(mut self, retry: CapacityRetry) -> Self {
        self.retry = retry;
        self
    }

    pub async fn handle(&self, delivery: Delivery) -> Outcome {
        match delivery {
            Delivery::Job(job) => self.run_job(job).await,
            Delivery::Malformed(bad) => {
                warn!(
                    reason = %bad.reason,
                    submission_id = ?bad.submission_id,
                    raw = %bad.raw,
                    "Dropping malformed job"
                );
                if let Some(user_id) = bad.user_id {
                    self.publish(&user_id, INVALID_SUBMISSION);
                }
                Outcome::Dropped
            }
        }
    }

    #[instrument(
        skip(self, job),
        fields(
            submission_id = %job.submission_id,
            user_id = %job.user_id,
            language = %job.language
        )
    )]
    async fn run_job(&self, job: JobRecord) -> Outcome {
        match self
            .store
            .transition(&job.submission_id, SubmissionStatus::UnderExecution, None)
            .await
        {
            Ok(Transition::Applied) => {}
            Ok(Transition::Rejected { current }) => {
                info!(status = %current, "Duplicate delivery, skipping");
                return Outcome::Duplicate;
            }
            Ok(Transition::NotFound) => {
                error!("Submission not found");
                self.publish(&job.user_id, SUBMISSION_NOT_SAVED);
                return Outcome::Dropped;
            }
            Err(e) => {
                error!(error = %e, "Failed to mark submission as executing");
                self.publish(&job.user_id, SUBMISSION_NOT_SAVED);
                return Outcome::Dropped;
            }
        }

        self.publish(&job.user_id, EXECUTING_CODE);

        let started = Instant::now();
        let (status, result) = match self.execute(&job).await {
            Ok(output) => {
                debug!(
                    exit_status = ?output.exit_status,
                    succeeded = output.succeeded(),
                    "Program finished"
                );
                (SubmissionStatus::Completed, output.output)
            }
            Err(e) if e.is_system_fault() => {
                error!(error = %e, "Execution failed");
                (SubmissionStatus::Failed, EXECUTION_FAILED.to_string())
            }
            Err(e) => {
                warn!(error = %e, "Execution did not complete");
                (SubmissionStatus::Failed, e.to_string())
            }
        };

        match self
            .store
            .transition(&job.submission_id, status, Some(&result))
            .await
        {
            Ok(Transition::Applied) => {}
            Ok(Transition::Rejected { current }) => {
                warn!(status = %current, "Submission finished elsewhere, discarding result");
                return Outcome::Duplicate;
            }
            Ok(Transition::NotFound) => {
                error!("Submission vanished before its result was saved");
                self.publish(&job.user_id, RESULT_NOT_SAVED);
                return Outcome::Dropped;
            }
            Err(e) => {
                error!(error = %e, "Failed to save result");
                self.publish(&job.user_id, RESULT_NOT_SAVED);
                return Outcome::Dropped;
            }
        }

        self.publish(&job.user_id, result);
        info!(
            status = %status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Submission finished"
        );

        match status {
            SubmissionStatus::Completed => Outcome::Completed,
            _ => Outcome::Failed,
        }
    }

    /// Run the job, waiting out a full executor pool a bounded number of times
    async fn execute(&self, job: &JobRecord) -> Result<ExecutionOutput, RunwayError> {
        let mut retries = 0;
        loop {
            match self.runner.execute(job.language, &job.code).await {
                Err(RunwayError::CapacityExceeded) if retries < self.retry.attempts => {
                    retries += 1;
                    warn!(attempt = retries, "All executors busy, retrying");
                    tokio::time::sleep(self.retry.delay).await;
                }
                other => return other,
            }
        }
    }

    fn publish(&self, user_id: &str, result: impl Into<serde_json::Value>) {
        if self.updates.send(ResultEvent::new(user_id, result)).is_err() {
            debug!(user_id, "Gateway link is gone, update dropped");
        }
    }
}
