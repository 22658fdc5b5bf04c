mod config;
mod handlers;
mod metrics;
mod routes;

use anyhow::Context;
use axum::Router;
use config::ApiConfig;
use redis::aio::ConnectionManager;
use runway_common::queue::{JobQueue, RedisJobQueue};
use runway_common::store::{RedisSubmissionStore, SubmissionStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub struct AppState {
    pub store: Arc<dyn SubmissionStore>,
    pub queue: Arc<dyn JobQueue>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    runway_common::config::load_dotenv();
    runway_common::telemetry::init("runway-api");

    let config = ApiConfig::from_env();

    let client = redis::Client::open(config.redis_url.as_str())
        .with_context(|| format!("Invalid REDIS_URL {}", config.redis_url))?;
    let redis_conn = ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;
    info!(queue = %config.queue, "Connected to Redis");

    let state = Arc::new(AppState {
        store: Arc::new(RedisSubmissionStore::new(redis_conn.clone(), config.key_prefix.clone())),
        queue: Arc::new(RedisJobQueue::new(redis_conn, config.queue.clone())),
    });

    let app = Router::new().merge(routes::routes()).with_state(state);

    let listener = TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.addr))?;
    info!("HTTP server listening on {}", config.addr);
    info!("Ready to accept jobs");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            warn!("Received shutdown signal");
        })
        .await
        .context("Server error")?;

    info!("API shutdown complete");
    Ok(())
}
