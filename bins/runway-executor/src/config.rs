use crate::languages::LanguageConfigManager;
use crate::output::DEFAULT_OUTPUT_LIMIT;
use anyhow::Result;
use runway_common::config::{env_bool, env_list, env_millis, env_parse, env_parse_opt, env_string};
use std::path::PathBuf;
use std::time::Duration;

/// Isolation settings applied to every sandbox container
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    pub timeout: Duration,
    pub pids_limit: i64,
    /// `uid:gid`, never root
    pub user: String,
    pub tty: bool,
    pub output_limit: usize,
    pub working_dir: String,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10_000),
            pids_limit: 64,
            user: "1001:1001".to_string(),
            tty: false,
            output_limit: DEFAULT_OUTPUT_LIMIT,
            working_dir: "/usr/src/app".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub addr: String,
    /// Front-door mode when non-empty: proxy to these executors instead of running Docker
    pub backends: Vec<String>,
    pub policy: SandboxPolicy,
    pub languages: LanguageConfigManager,
    pub languages_path: PathBuf,
}

impl ExecutorConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = SandboxPolicy::default();
        let policy = SandboxPolicy {
            timeout: env_millis("EXECUTOR_TIMEOUT_MS", defaults.timeout.as_millis() as u64)?,
            pids_limit: env_parse("SANDBOX_PIDS_LIMIT", defaults.pids_limit)?,
            user: env_string("SANDBOX_USER", &defaults.user),
            tty: env_bool("SANDBOX_TTY", defaults.tty)?,
            output_limit: env_parse("SANDBOX_OUTPUT_LIMIT", defaults.output_limit)?,
            working_dir: defaults.working_dir,
        };
        if policy.user.starts_with("0:") || policy.user == "0" || policy.user == "root" {
            anyhow::bail!("SANDBOX_USER must not be root");
        }

        let memory_mb: Option<u32> = env_parse_opt("SANDBOX_MEMORY_MB")?;
        let cpu_shares: i64 = env_parse("SANDBOX_CPU_SHARES", 512)?;
        let languages_path = PathBuf::from(env_string("LANGUAGES_CONFIG", "config/languages.json"));
        let languages = LanguageConfigManager::load_optional(&languages_path, memory_mb, cpu_shares)?;

        Ok(Self {
            addr: env_string("EXECUTOR_ADDR", "0.0.0.0:8081"),
            backends: env_list("EXECUTOR_BACKENDS"),
            policy,
            languages,
            languages_path,
        })
    }

    pub fn is_front_door(&self) -> bool {
        !self.backends.is_empty()
    }
}
