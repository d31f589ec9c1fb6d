//! Batch job routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
}

/// GET /api/jobs — all jobs, newest first.
async fn list_jobs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let jobs = state.engine.jobs();
    let total = jobs.len();
    Json(serde_json::json!({ "jobs": jobs, "total": total }))
}

/// GET /api/jobs/:id — one job with per-sample outcomes.
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.engine.job(&id) {
        Some(job) => (StatusCode::OK, Json(serde_json::json!(job))),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Job not found" })),
        ),
    }
}

/// POST /api/jobs/:id/cancel — request cancellation. In-flight samples
/// finish; nothing new starts.
async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.engine.cancel_job(&id) {
        (StatusCode::ACCEPTED, Json(serde_json::json!({ "cancelling": true })))
    } else {
        (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": "Job not found or already finished" })),
        )
    }
}
