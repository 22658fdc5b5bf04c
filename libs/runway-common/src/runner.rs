use crate::error::RunwayError;
use crate::language::Language;
use crate::types::ExecutionOutput;
use async_trait::async_trait;

/// Anything that can run one program to completion: the Docker engine, a
/// remote executor, or the pooled front door over several of them.
///
/// `Ok` means the program ran (any exit status). Every way it could not
/// run, including hitting its deadline, is an `Err`.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn execute(&self, language: Language, code: &str)
        -> Result<ExecutionOutput, RunwayError>;
}
