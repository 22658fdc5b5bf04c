use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/run", post(handlers::submit_job))
        .route("/submit", post(handlers::submit_job))
        .route("/submission/:id", get(handlers::get_submission))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_text))
}
