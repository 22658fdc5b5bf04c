mod archive;
mod config;
mod deadline;
mod engine;
mod handlers;
mod languages;
mod metrics;
mod output;
mod proxy;

#[cfg(test)]
mod engine_tests;

use anyhow::Context;
use config::ExecutorConfig;
use engine::DockerEngine;
use handlers::AppState;
use proxy::PooledRunner;
use runway_common::pool::BackendPool;
use runway_common::remote::backend_timeout;
use runway_common::runner::CodeRunner;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    runway_common::config::load_dotenv();
    runway_common::telemetry::init("runway-executor");

    let config = ExecutorConfig::from_env()?;

    let (runner, pool): (Arc<dyn CodeRunner>, Option<BackendPool>) = if config.is_front_door() {
        let pool = BackendPool::new(config.backends.clone());
        info!(backends = ?config.backends, "Front-door mode");
        let runner = PooledRunner::new(pool.clone(), backend_timeout(config.policy.timeout))?;
        (Arc::new(runner), Some(pool))
    } else {
        info!(
            timeout_ms = config.policy.timeout.as_millis() as u64,
            user = %config.policy.user,
            tty = config.policy.tty,
            overrides = ?config.languages.overridden(),
            languages_config = %config.languages_path.display(),
            "Sandbox mode"
        );
        let engine = DockerEngine::new(config.languages.clone(), config.policy.clone())?;
        (Arc::new(engine), None)
    };

    let app = handlers::routes(AppState { runner, pool });

    let listener = TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.addr))?;
    info!("HTTP server listening on {}", config.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            warn!("Received shutdown signal");
        })
        .await
        .context("Server error")?;

    info!("Executor shutdown complete");
    Ok(())
}
