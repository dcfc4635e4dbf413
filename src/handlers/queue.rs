// src/handlers/queue.rs
//! Queue endpoints - enqueue, inspect, review, retry, cancel, remove,
//! force dispatch

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::queue::{JobId, JobSpec, QueueError, Segment};
use crate::AppState;

#[derive(Deserialize)]
pub struct ConfirmReviewRequest {
    /// Edited draft content; omitted to confirm the draft as-is
    #[serde(default)]
    pub segments: Option<Vec<Segment>>,
}

fn queue_error_response(e: QueueError) -> axum::response::Response {
    let status = match e {
        QueueError::NotFound(_) | QueueError::ItemNotFound(_) => StatusCode::NOT_FOUND,
        QueueError::InvalidTransition { .. } | QueueError::RemoveWhileProcessing(_) => {
            StatusCode::CONFLICT
        }
        QueueError::ReviewShapeMismatch => StatusCode::BAD_REQUEST,
    };
    (status, e.to_string()).into_response()
}

/// POST /api/queue - validate and enqueue a job
pub async fn enqueue_job(
    Extension(state): Extension<Arc<AppState>>,
    Json(spec): Json<JobSpec>,
) -> impl IntoResponse {
    match state.queue.enqueue(spec).await {
        Ok(job) => (StatusCode::CREATED, Json(job)).into_response(),
        Err(e) => {
            tracing::warn!("rejected job spec: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

/// GET /api/queue - ordered snapshot of all jobs
pub async fn list_jobs(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let jobs = state.queue.list().await;
    Json(serde_json::json!({
        "job_count": jobs.len(),
        "jobs": jobs,
    }))
}

/// GET /api/queue/:job_id - one job, drafted segments included
pub async fn get_job(
    Path(job_id): Path<JobId>,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    match state.queue.get(job_id).await {
        Some(job) => (StatusCode::OK, Json(job)).into_response(),
        None => (StatusCode::NOT_FOUND, "Job not found").into_response(),
    }
}

/// POST /api/queue/:job_id/review/confirm - pass the review gate
pub async fn confirm_review(
    Path(job_id): Path<JobId>,
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<ConfirmReviewRequest>,
) -> impl IntoResponse {
    match state.queue.confirm_review(job_id, request.segments).await {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(e) => queue_error_response(e),
    }
}

/// POST /api/queue/:job_id/retry - re-enqueue a failed job at the tail
pub async fn retry_job(
    Path(job_id): Path<JobId>,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    match state.queue.retry(job_id).await {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(e) => queue_error_response(e),
    }
}

/// POST /api/queue/:job_id/cancel
pub async fn cancel_job(
    Path(job_id): Path<JobId>,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    match state.queue.cancel(job_id).await {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(e) => queue_error_response(e),
    }
}

/// DELETE /api/queue/:job_id
pub async fn remove_job(
    Path(job_id): Path<JobId>,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    match state.queue.remove(job_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => queue_error_response(e),
    }
}

/// POST /api/queue/dispatch - attempt an immediate dispatch
pub async fn force_dispatch(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    let dispatched = state.queue.force_dispatch().await;
    Json(serde_json::json!({ "dispatched": dispatched }))
}

/// Routes for queue management
pub fn queue_routes() -> Router {
    Router::new()
        .route("/api/queue", post(enqueue_job).get(list_jobs))
        .route("/api/queue/dispatch", post(force_dispatch))
        .route("/api/queue/:job_id", get(get_job).delete(remove_job))
        .route("/api/queue/:job_id/review/confirm", post(confirm_review))
        .route("/api/queue/:job_id/retry", post(retry_job))
        .route("/api/queue/:job_id/cancel", post(cancel_job))
}
