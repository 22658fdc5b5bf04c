use anyhow::Result;
use runway_common::config::{env_millis, env_parse, env_required, env_string, DEFAULT_REDIS_URL};
use runway_common::redis::{DEFAULT_PREFIX, DEFAULT_QUEUE};
use runway_common::reconnect::ReconnectPolicy;
use runway_common::remote::caller_timeout;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub redis_url: String,
    pub queue: String,
    pub key_prefix: String,
    pub executor_url: String,
    pub request_timeout: Duration,
    pub gateway_url: String,
    pub worker_secret: String,
    pub reconnect: ReconnectPolicy,
    pub capacity_retry_attempts: u32,
    pub capacity_retry_delay: Duration,
    pub pop_timeout: Duration,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        let sandbox_timeout = env_millis("EXECUTOR_TIMEOUT_MS", 10_000)?;
        Ok(Self {
            redis_url: env_string("REDIS_URL", DEFAULT_REDIS_URL),
            queue: env_string("REDIS_QUEUE", DEFAULT_QUEUE),
            key_prefix: env_string("REDIS_KEY_PREFIX", DEFAULT_PREFIX),
            executor_url: env_string("EXECUTOR_URL", "http://127.0.0.1:8081"),
            request_timeout: caller_timeout(sandbox_timeout),
            gateway_url: env_string("WS_URL", "ws://127.0.0.1:8080"),
            worker_secret: env_required("WORKER_SECRET")?,
            reconnect: ReconnectPolicy::fixed(env_millis("RECONNECT_DELAY_MS", 5_000)?),
            capacity_retry_attempts: env_parse("CAPACITY_RETRY_ATTEMPTS", 3)?,
            capacity_retry_delay: env_millis("CAPACITY_RETRY_DELAY_MS", 1_000)?,
            pop_timeout: Duration::from_secs(5),
        })
    }
}
