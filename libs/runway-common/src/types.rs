use crate::error::{ErrorKind, RunwayError};
use crate::language::Language;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Submission lifecycle: PENDING -> UNDER_EXECUTION -> COMPLETED | FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Pending,
    UnderExecution,
    Completed,
    Failed,
}

impl SubmissionStatus {
    pub fn rank(&self) -> u8 {
        match self {
            SubmissionStatus::Pending => 0,
            SubmissionStatus::UnderExecution => 1,
            SubmissionStatus::Completed | SubmissionStatus::Failed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() >= 2
    }

    /// Transitions never regress and never leave a terminal state.
    /// Re-entering UNDER_EXECUTION is allowed so a redelivered job can run again
    /// after a crash mid-execution.
    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (SubmissionStatus::Pending, SubmissionStatus::Pending) => false,
            _ => next.rank() >= self.rank(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "PENDING",
            SubmissionStatus::UnderExecution => "UNDER_EXECUTION",
            SubmissionStatus::Completed => "COMPLETED",
            SubmissionStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = RunwayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SubmissionStatus::Pending),
            "UNDER_EXECUTION" => Ok(SubmissionStatus::UnderExecution),
            "COMPLETED" => Ok(SubmissionStatus::Completed),
            "FAILED" => Ok(SubmissionStatus::Failed),
            other => Err(RunwayError::Persistence(format!(
                "unknown submission status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub code: String,
    pub language: Language,
    pub status: SubmissionStatus,
    pub result: Option<String>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub code: String,
    pub language: Language,
    pub user_id: String,
}

/// Queue payload: immutable snapshot of one execution request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub language: Language,
    pub code: String,
    pub user_id: String,
    pub submission_id: String,
}

impl JobRecord {
    pub fn for_submission(submission: &Submission) -> Self {
        Self {
            language: submission.language,
            code: submission.code.clone(),
            user_id: submission.user_id.clone(),
            submission_id: submission.id.clone(),
        }
    }
}

/// Lenient decode target for queue entries; every field may be absent
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawJobRecord {
    language: Option<String>,
    code: Option<String>,
    user_id: Option<String>,
    submission_id: Option<String>,
}

/// A queue entry that could not be turned into a [`JobRecord`]
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedJob {
    pub raw: String,
    pub reason: RunwayError,
    pub user_id: Option<String>,
    pub submission_id: Option<String>,
}

/// One entry taken off the queue
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Job(JobRecord),
    Malformed(MalformedJob),
}

impl Delivery {
    /// Decode and validate a raw queue entry.
    /// Language, code, user id and submission id must all be present and non-empty.
    pub fn parse(raw: &str) -> Self {
        let record: RawJobRecord = match serde_json::from_str(raw) {
            Ok(record) => record,
            Err(e) => {
                return Delivery::Malformed(MalformedJob {
                    raw: raw.to_string(),
                    reason: RunwayError::Validation(format!("undecodable job payload: {}", e)),
                    user_id: None,
                    submission_id: None,
                })
            }
        };

        let present = |v: &Option<String>| v.as_deref().filter(|s| !s.trim().is_empty()).map(str::to_string);
        let user_id = present(&record.user_id);
        let submission_id = present(&record.submission_id);
        let malformed = |reason: RunwayError| {
            Delivery::Malformed(MalformedJob {
                raw: raw.to_string(),
                reason,
                user_id: user_id.clone(),
                submission_id: submission_id.clone(),
            })
        };

        let (Some(language), Some(code), Some(uid), Some(sid)) = (
            present(&record.language),
            record.code.clone().filter(|c| !c.trim().is_empty()),
            user_id.clone(),
            submission_id.clone(),
        ) else {
            return malformed(RunwayError::Validation("Invalid submission data".to_string()));
        };

        match language.parse::<Language>() {
            Ok(language) => Delivery::Job(JobRecord {
                language,
                code,
                user_id: uid,
                submission_id: sid,
            }),
            Err(e) => malformed(e),
        }
    }
}

/// Body of `POST /execute`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl ExecuteRequest {
    pub fn new(language: Language, code: &str) -> Self {
        Self {
            language: Some(language.as_str().to_string()),
            code: Some(code.to_string()),
        }
    }

    /// Reject absent fields and unknown languages before anything is provisioned
    pub fn validate(&self) -> Result<(Language, &str), RunwayError> {
        let (Some(language), Some(code)) = (
            self.language.as_deref().filter(|l| !l.trim().is_empty()),
            self.code.as_deref().filter(|c| !c.is_empty()),
        ) else {
            return Err(RunwayError::Validation(
                "Language and code are required.".to_string(),
            ));
        };
        Ok((language.parse()?, code))
    }
}

/// Output of one sandboxed run that finished before its deadline
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutput {
    /// Combined stdout and stderr in arrival order
    pub output: String,
    pub exit_status: Option<i64>,
    pub elapsed: Duration,
}

impl ExecutionOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_status == Some(0)
    }
}

/// Body returned by `POST /execute`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub success: bool,
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ExecuteResponse {
    pub fn from_output(output: &ExecutionOutput) -> Self {
        Self {
            success: true,
            result: output.output.clone(),
            exit_status: output.exit_status,
            elapsed_ms: Some(output.elapsed.as_millis() as u64),
            error: None,
            detail: None,
        }
    }

    pub fn from_error(err: &RunwayError) -> Self {
        Self {
            success: false,
            result: err.to_string(),
            exit_status: None,
            elapsed_ms: None,
            error: Some(err.kind()),
            detail: err.detail(),
        }
    }

    /// Turn a response back into the executor's outcome
    pub fn into_result(self) -> Result<ExecutionOutput, RunwayError> {
        if self.success {
            return Ok(ExecutionOutput {
                output: self.result,
                exit_status: self.exit_status,
                elapsed: Duration::from_millis(self.elapsed_ms.unwrap_or(0)),
            });
        }
        Err(match self.error {
            Some(kind) => RunwayError::from_parts(kind, self.detail),
            None => RunwayError::SandboxFailure(self.result),
        })
    }
}
