mod auth;
mod config;
mod registry;
mod socket;

use anyhow::Context;
use auth::Authenticator;
use config::GatewayConfig;
use registry::ConnectionRegistry;
use socket::GatewayState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    runway_common::config::load_dotenv();
    runway_common::telemetry::init("runway-gateway");

    let config = GatewayConfig::from_env()?;

    let state = GatewayState {
        registry: Arc::new(ConnectionRegistry::new()),
        auth: Arc::new(Authenticator::new(&config.jwt_secret, &config.worker_secret)),
    };

    let listener = TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.addr))?;
    info!("WebSocket gateway listening on {}", config.addr);

    axum::serve(listener, socket::router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            warn!("Received shutdown signal");
        })
        .await
        .context("Server error")?;

    info!("Gateway shutdown complete");
    Ok(())
}
