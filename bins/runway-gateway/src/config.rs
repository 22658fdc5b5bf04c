use anyhow::Result;
use runway_common::config::{env_required, env_string};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub addr: String,
    pub jwt_secret: String,
    pub worker_secret: String,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            addr: env_string("GATEWAY_ADDR", "0.0.0.0:8080"),
            jwt_secret: env_required("JWT_SECRET")?,
            worker_secret: env_required("WORKER_SECRET")?,
        };
        if config.jwt_secret == config.worker_secret {
            anyhow::bail!("JWT_SECRET and WORKER_SECRET must differ");
        }
        Ok(config)
    }
}
