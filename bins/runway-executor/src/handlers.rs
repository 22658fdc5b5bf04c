// HTTP handlers for the Runway executor

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use runway_common::pool::BackendPool;
use runway_common::runner::CodeRunner;
use runway_common::types::{ExecuteRequest, ExecuteResponse};
use runway_common::RunwayError;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::metrics;

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<dyn CodeRunner>,
    /// Set in front-door mode only
    pub pool: Option<BackendPool>,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/execute", post(execute))
        .route("/health", get(health_check))
        .route("/backends", get(list_backends))
        .route("/metrics", get(metrics_text))
        .with_state(state)
}

/// HTTP status for each failure. A timeout is a normal outcome for the
/// program, so it is reported with 200 and `success: false`.
pub fn status_for(err: &RunwayError) -> StatusCode {
    match err {
        RunwayError::Validation(_) | RunwayError::UnsupportedLanguage(_) => StatusCode::BAD_REQUEST,
        RunwayError::Unauthorized => StatusCode::UNAUTHORIZED,
        RunwayError::CapacityExceeded => StatusCode::SERVICE_UNAVAILABLE,
        RunwayError::ExecutionTimeout(_) => StatusCode::OK,
        RunwayError::ImageUnavailable(_)
        | RunwayError::SandboxFailure(_)
        | RunwayError::Persistence(_)
        | RunwayError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &RunwayError) -> Response {
    (status_for(err), Json(ExecuteResponse::from_error(err))).into_response()
}

fn outcome_label(err: &RunwayError) -> &'static str {
    match err {
        RunwayError::ExecutionTimeout(_) => "timeout",
        RunwayError::CapacityExceeded => "busy",
        e if e.is_client_error() => "rejected",
        _ => "error",
    }
}

/// POST /execute - Run one program
pub async fn execute(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected execute body");
            return error_response(&RunwayError::Validation(
                "Language and code are required.".to_string(),
            ));
        }
    };

    let (language, code) = match request.validate() {
        Ok(valid) => valid,
        Err(e) => {
            metrics::EXECUTIONS_TOTAL
                .with_label_values(&["unknown", outcome_label(&e)])
                .inc();
            return error_response(&e);
        }
    };

    let started = Instant::now();
    match state.runner.execute(language, code).await {
        Ok(output) => {
            metrics::EXECUTIONS_TOTAL
                .with_label_values(&[language.slug(), "completed"])
                .inc();
            metrics::EXECUTION_DURATION
                .with_label_values(&[language.slug()])
                .observe(output.elapsed.as_secs_f64());
            info!(
                language = %language,
                exit_status = ?output.exit_status,
                elapsed_ms = output.elapsed.as_millis() as u64,
                "Execution completed"
            );
            (StatusCode::OK, Json(ExecuteResponse::from_output(&output))).into_response()
        }
        Err(e) => {
            metrics::EXECUTIONS_TOTAL
                .with_label_values(&[language.slug(), outcome_label(&e)])
                .inc();
            let elapsed_ms = started.elapsed().as_millis() as u64;
            if e.is_system_fault() {
                error!(language = %language, elapsed_ms, error = %e, "Execution failed");
            } else {
                warn!(language = %language, elapsed_ms, error = %e, "Execution not completed");
            }
            error_response(&e)
        }
    }
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let mode = if state.pool.is_some() { "front-door" } else { "sandbox" };
    Json(serde_json::json!({ "status": "ok", "mode": mode }))
}

/// GET /backends - Busy flags of the pooled backends
pub async fn list_backends(State(state): State<AppState>) -> impl IntoResponse {
    let backends = state.pool.as_ref().map(|p| p.snapshot()).unwrap_or_default();
    Json(serde_json::json!({ "backends": backends }))
}

/// GET /metrics
pub async fn metrics_text() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}
