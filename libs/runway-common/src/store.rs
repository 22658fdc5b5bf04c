//! Submission record store.
//!
//! One row per submission, one write per state transition. Transition
//! checks run inside the store so that concurrent or repeated writers can
//! never regress a status or overwrite a terminal result.

use crate::error::RunwayError;
use crate::language::Language;
use crate::redis::submission_key;
use crate::types::{NewSubmission, Submission, SubmissionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Outcome of a status write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// The write would regress or leave a terminal state; nothing changed
    Rejected { current: SubmissionStatus },
    NotFound,
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Create a submission in PENDING
    async fn create(&self, new: NewSubmission) -> Result<Submission, RunwayError>;

    async fn get(&self, id: &str) -> Result<Option<Submission>, RunwayError>;

    /// Move a submission to `status`. `result` is only written together with a
    /// terminal status.
    async fn transition(
        &self,
        id: &str,
        status: SubmissionStatus,
        result: Option<&str>,
    ) -> Result<Transition, RunwayError>;

    /// Remove a submission whose job never made it onto the queue
    async fn delete(&self, id: &str) -> Result<(), RunwayError>;
}

fn new_record(new: NewSubmission) -> Submission {
    let now = Utc::now();
    Submission {
        id: Uuid::new_v4().to_string(),
        code: new.code,
        language: new.language,
        status: SubmissionStatus::Pending,
        result: None,
        user_id: new.user_id,
        created_at: now,
        updated_at: now,
    }
}

/// Compare-and-set on the status rank, executed atomically by Redis.
/// ARGV: status, rank, updatedAt, hasResult, result
const TRANSITION_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'status')
if not current then
  return {'missing', ''}
end
local rank = tonumber(redis.call('HGET', KEYS[1], 'rank'))
local next_rank = tonumber(ARGV[2])
if rank >= 2 or next_rank < rank or (rank == 0 and next_rank == 0) then
  return {'rejected', current}
end
redis.call('HSET', KEYS[1], 'status', ARGV[1], 'rank', ARGV[2], 'updatedAt', ARGV[3])
if ARGV[4] == '1' then
  redis.call('HSET', KEYS[1], 'result', ARGV[5])
end
return {'applied', ARGV[1]}
"#;

#[derive(Clone)]
pub struct RedisSubmissionStore {
    conn: ConnectionManager,
    prefix: String,
    transition: std::sync::Arc<redis::Script>,
}

impl RedisSubmissionStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
            transition: std::sync::Arc::new(redis::Script::new(TRANSITION_SCRIPT)),
        }
    }

    fn key(&self, id: &str) -> String {
        submission_key(&self.prefix, id)
    }
}

fn persistence(e: redis::RedisError) -> RunwayError {
    RunwayError::Persistence(e.to_string())
}

fn parse_time(fields: &HashMap<String, String>, name: &str) -> Result<DateTime<Utc>, RunwayError> {
    let raw = fields
        .get(name)
        .ok_or_else(|| RunwayError::Persistence(format!("submission is missing '{}'", name)))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RunwayError::Persistence(format!("bad timestamp '{}': {}", name, e)))
}

fn from_fields(mut fields: HashMap<String, String>) -> Result<Submission, RunwayError> {
    let created_at = parse_time(&fields, "createdAt")?;
    let updated_at = parse_time(&fields, "updatedAt")?;
    let mut take = |name: &str| {
        fields
            .remove(name)
            .ok_or_else(|| RunwayError::Persistence(format!("submission is missing '{}'", name)))
    };
    let id = take("id")?;
    let code = take("code")?;
    let language = take("language")?
        .parse::<Language>()
        .map_err(|e| RunwayError::Persistence(e.to_string()))?;
    let status = take("status")?.parse::<SubmissionStatus>()?;
    let user_id = take("userId")?;
    let result = take("result").ok();

    Ok(Submission {
        id,
        code,
        language,
        status,
        result,
        user_id,
        created_at,
        updated_at,
    })
}

#[async_trait]
impl SubmissionStore for RedisSubmissionStore {
    async fn create(&self, new: NewSubmission) -> Result<Submission, RunwayError> {
        let submission = new_record(new);
        let created = submission.created_at.to_rfc3339();
        let rank = submission.status.rank().to_string();
        let fields = [
            ("id", submission.id.as_str()),
            ("code", submission.code.as_str()),
            ("language", submission.language.as_str()),
            ("status", submission.status.as_str()),
            ("rank", rank.as_str()),
            ("userId", submission.user_id.as_str()),
            ("createdAt", created.as_str()),
            ("updatedAt", created.as_str()),
        ];

        let mut conn = self.conn.clone();
        let _: () = conn
            .hset_multiple(self.key(&submission.id), &fields)
            .await
            .map_err(persistence)?;
        Ok(submission)
    }

    async fn get(&self, id: &str) -> Result<Option<Submission>, RunwayError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> =
            conn.hgetall(self.key(id)).await.map_err(persistence)?;
        if fields.is_empty() {
            return Ok(None);
        }
        from_fields(fields).map(Some)
    }

    async fn transition(
        &self,
        id: &str,
        status: SubmissionStatus,
        result: Option<&str>,
    ) -> Result<Transition, RunwayError> {
        let write_result = status.is_terminal() && result.is_some();
        let mut conn = self.conn.clone();
        let (outcome, current): (String, String) = self
            .transition
            .key(self.key(id))
            .arg(status.as_str())
            .arg(i64::from(status.rank()))
            .arg(Utc::now().to_rfc3339())
            .arg(if write_result { "1" } else { "0" })
            .arg(result.unwrap_or_default())
            .invoke_async(&mut conn)
            .await
            .map_err(persistence)?;

        match outcome.as_str() {
            "applied" => Ok(Transition::Applied),
            "missing" => Ok(Transition::NotFound),
            _ => Ok(Transition::Rejected {
                current: current.parse()?,
            }),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), RunwayError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(self.key(id)).await.map_err(persistence)?;
        Ok(())
    }
}

/// Process-local store with the same transition rules
#[derive(Default)]
pub struct MemorySubmissionStore {
    rows: RwLock<HashMap<String, Submission>>,
}

impl MemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row verbatim, bypassing transition checks
    pub async fn insert(&self, submission: Submission) {
        self.rows
            .write()
            .await
            .insert(submission.id.clone(), submission);
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn create(&self, new: NewSubmission) -> Result<Submission, RunwayError> {
        let submission = new_record(new);
        self.insert(submission.clone()).await;
        Ok(submission)
    }

    async fn get(&self, id: &str) -> Result<Option<Submission>, RunwayError> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn transition(
        &self,
        id: &str,
        status: SubmissionStatus,
        result: Option<&str>,
    ) -> Result<Transition, RunwayError> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.get_mut(id) else {
            return Ok(Transition::NotFound);
        };
        if !row.status.can_transition_to(status) {
            return Ok(Transition::Rejected {
                current: row.status,
            });
        }
        row.status = status;
        row.updated_at = Utc::now();
        if status.is_terminal() {
            if let Some(result) = result {
                row.result = Some(result.to_string());
            }
        }
        Ok(Transition::Applied)
    }

    async fn delete(&self, id: &str) -> Result<(), RunwayError> {
        self.rows.write().await.remove(id);
        Ok(())
    }
}
