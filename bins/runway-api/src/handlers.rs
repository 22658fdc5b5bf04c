// HTTP route handlers for the Runway API

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use runway_common::types::{JobRecord, NewSubmission};
use runway_common::Language;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub user_id: Option<String>,
    pub code: Option<String>,
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub success: bool,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<String>,
}

fn failure(status: StatusCode, result: impl Into<String>) -> Response {
    (
        status,
        Json(RunResponse {
            success: false,
            result: result.into(),
            submission_id: None,
        }),
    )
        .into_response()
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// POST /run, POST /submit - Persist a submission and queue it
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection, "Rejected submission body");
            metrics::rejected("unknown", "invalid");
            return failure(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };

    let Some(user_id) = present(request.user_id) else {
        metrics::rejected("unknown", "unauthorized");
        return failure(StatusCode::UNAUTHORIZED, "Unauthorized");
    };
    let (Some(code), Some(language)) = (present(request.code), present(request.language)) else {
        metrics::rejected("unknown", "invalid");
        return failure(StatusCode::BAD_REQUEST, "Code and Language are required");
    };
    let language = match language.parse::<Language>() {
        Ok(language) => language,
        Err(e) => {
            metrics::rejected("unknown", "unsupported");
            return failure(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    let submission = match state
        .store
        .create(NewSubmission {
            code,
            language,
            user_id,
        })
        .await
    {
        Ok(submission) => submission,
        Err(e) => {
            error!(error = %e, "Failed to create submission");
            metrics::rejected(language.slug(), "error");
            return failure(StatusCode::INTERNAL_SERVER_ERROR, "Submission was not saved");
        }
    };

    if let Err(e) = state.queue.push(&JobRecord::for_submission(&submission)).await {
        error!(submission_id = %submission.id, error = %e, "Failed to queue submission");
        if let Err(e) = state.store.delete(&submission.id).await {
            error!(submission_id = %submission.id, error = %e, "Rollback failed");
        }
        metrics::rejected(language.slug(), "error");
        return failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to add submission to the queue",
        );
    }

    info!(
        submission_id = %submission.id,
        user_id = %submission.user_id,
        language = %language,
        source_size = submission.code.len(),
        "Submission queued"
    );
    metrics::accepted(language.slug());

    (
        StatusCode::OK,
        Json(RunResponse {
            success: true,
            result: "Submission saved".to_string(),
            submission_id: Some(submission.id),
        }),
    )
        .into_response()
}

/// GET /submission/{id} - Current state of one submission
pub async fn get_submission(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    if Uuid::parse_str(&id).is_err() {
        return failure(StatusCode::BAD_REQUEST, "Invalid submission id");
    }

    match state.store.get(&id).await {
        Ok(Some(submission)) => (StatusCode::OK, Json(submission)).into_response(),
        Ok(None) => failure(StatusCode::NOT_FOUND, "Submission not found"),
        Err(e) => {
            error!(submission_id = %id, error = %e, "Failed to fetch submission");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch submission")
        }
    }
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics
pub async fn metrics_text() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}
