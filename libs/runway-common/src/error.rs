//! Error taxonomy shared by every Runway service

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RunwayError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunwayError {
    /// Malformed request or payload. Never retried.
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid credential
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// No free executor backend. The caller owns the retry.
    #[error("All executors are busy")]
    CapacityExceeded,

    /// Sandbox exceeded its wall-clock deadline (milliseconds)
    #[error("Execution timed out after {0}ms")]
    ExecutionTimeout(u64),

    #[error("Image unavailable: {0}")]
    ImageUnavailable(String),

    /// The isolation environment could not be created or started
    #[error("Sandbox failure: {0}")]
    SandboxFailure(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Queue failure: {0}")]
    Queue(String),
}

/// Wire discriminant for [`RunwayError`], carried in executor responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ValidationError,
    Unauthorized,
    UnsupportedLanguage,
    CapacityExceeded,
    ExecutionTimeout,
    ImageUnavailable,
    SandboxFailure,
    PersistenceFailure,
    QueueFailure,
}

impl RunwayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunwayError::Validation(_) => ErrorKind::ValidationError,
            RunwayError::Unauthorized => ErrorKind::Unauthorized,
            RunwayError::UnsupportedLanguage(_) => ErrorKind::UnsupportedLanguage,
            RunwayError::CapacityExceeded => ErrorKind::CapacityExceeded,
            RunwayError::ExecutionTimeout(_) => ErrorKind::ExecutionTimeout,
            RunwayError::ImageUnavailable(_) => ErrorKind::ImageUnavailable,
            RunwayError::SandboxFailure(_) => ErrorKind::SandboxFailure,
            RunwayError::Persistence(_) => ErrorKind::PersistenceFailure,
            RunwayError::Queue(_) => ErrorKind::QueueFailure,
        }
    }

    /// Variant payload in string form, so the error survives a hop over HTTP
    pub fn detail(&self) -> Option<String> {
        match self {
            RunwayError::Validation(s)
            | RunwayError::UnsupportedLanguage(s)
            | RunwayError::ImageUnavailable(s)
            | RunwayError::SandboxFailure(s)
            | RunwayError::Persistence(s)
            | RunwayError::Queue(s) => Some(s.clone()),
            RunwayError::ExecutionTimeout(ms) => Some(ms.to_string()),
            RunwayError::Unauthorized | RunwayError::CapacityExceeded => None,
        }
    }

    /// Rebuild an error from its wire kind and detail
    pub fn from_parts(kind: ErrorKind, detail: Option<String>) -> Self {
        let detail_or = |fallback: &str| detail.clone().unwrap_or_else(|| fallback.to_string());
        match kind {
            ErrorKind::ValidationError => RunwayError::Validation(detail_or("invalid request")),
            ErrorKind::Unauthorized => RunwayError::Unauthorized,
            ErrorKind::UnsupportedLanguage => {
                RunwayError::UnsupportedLanguage(detail_or("unknown"))
            }
            ErrorKind::CapacityExceeded => RunwayError::CapacityExceeded,
            ErrorKind::ExecutionTimeout => RunwayError::ExecutionTimeout(
                detail.as_deref().and_then(|d| d.parse().ok()).unwrap_or(0),
            ),
            ErrorKind::ImageUnavailable => RunwayError::ImageUnavailable(detail_or("unknown")),
            ErrorKind::SandboxFailure => RunwayError::SandboxFailure(detail_or("unknown")),
            ErrorKind::PersistenceFailure => RunwayError::Persistence(detail_or("unknown")),
            ErrorKind::QueueFailure => RunwayError::Queue(detail_or("unknown")),
        }
    }

    /// Client-caused errors are surfaced as-is and never retried
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RunwayError::Validation(_) | RunwayError::Unauthorized | RunwayError::UnsupportedLanguage(_)
        )
    }

    /// System faults are logged with full context and degrade to a generic result
    pub fn is_system_fault(&self) -> bool {
        matches!(
            self,
            RunwayError::SandboxFailure(_)
                | RunwayError::ImageUnavailable(_)
                | RunwayError::Persistence(_)
                | RunwayError::Queue(_)
        )
    }
}
