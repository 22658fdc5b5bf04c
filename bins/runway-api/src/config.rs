use runway_common::config::{env_string, DEFAULT_REDIS_URL};
use runway_common::redis::{DEFAULT_PREFIX, DEFAULT_QUEUE};

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub addr: String,
    pub redis_url: String,
    pub queue: String,
    pub key_prefix: String,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self {
            addr: env_string("API_ADDR", "0.0.0.0:3000"),
            redis_url: env_string("REDIS_URL", DEFAULT_REDIS_URL),
            queue: env_string("REDIS_QUEUE", DEFAULT_QUEUE),
            key_prefix: env_string("REDIS_KEY_PREFIX", DEFAULT_PREFIX),
        }
    }
}
