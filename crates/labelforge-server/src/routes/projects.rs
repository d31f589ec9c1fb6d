//! Project routes: creation, policy updates, sample import, labeling, export.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::routes::error_response;
use crate::state::AppState;
use labelforge_store::TaskType;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/projects", post(create_project).get(list_projects))
        .route("/projects/{id}", get(get_project))
        .route("/projects/{id}/policy", patch(update_policy))
        .route("/projects/{id}/samples", post(import_samples))
        .route("/projects/{id}/label", post(label))
        .route("/projects/{id}/export", get(export_project))
}

#[derive(Deserialize)]
struct CreateProjectRequest {
    name: String,
    task_type: String,
    label_schema: Vec<String>,
    confidence_threshold: Option<f64>,
    require_double_annotation: Option<bool>,
    agreement_threshold: Option<f64>,
}

/// POST /api/projects — create a project.
async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> impl IntoResponse {
    let Some(task_type) = TaskType::parse(&req.task_type) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": format!("unknown task type '{}'", req.task_type)
            })),
        )
            .into_response();
    };

    match state.engine.create_project(
        &req.name,
        task_type,
        req.label_schema,
        req.confidence_threshold,
        req.require_double_annotation,
        req.agreement_threshold,
    ) {
        Ok(project) => (StatusCode::CREATED, Json(serde_json::json!(project))).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// GET /api/projects — list all projects.
async fn list_projects(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.engine.store().list_projects() {
        Ok(projects) => Json(serde_json::json!({ "projects": projects })).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// GET /api/projects/:id — project with its latest quality snapshot.
async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let project = match state.engine.store().get_project(id) {
        Ok(Some(p)) => p,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": "Project not found" })),
            )
                .into_response()
        }
        Err(e) => return error_response(e).into_response(),
    };
    let quality = state.engine.store().latest_quality_metric(id).ok().flatten();
    Json(serde_json::json!({ "project": project, "quality": quality })).into_response()
}

#[derive(Deserialize)]
struct UpdatePolicyRequest {
    confidence_threshold: Option<f64>,
    require_double_annotation: Option<bool>,
    agreement_threshold: Option<f64>,
}

/// PATCH /api/projects/:id/policy — update thresholds; bumps the policy
/// version. In-flight batches keep their snapshot.
async fn update_policy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePolicyRequest>,
) -> impl IntoResponse {
    match state.engine.store().update_project_policy(
        id,
        req.confidence_threshold,
        req.require_double_annotation,
        req.agreement_threshold,
    ) {
        Ok(project) => Json(serde_json::json!(project)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// POST /api/projects/:id/samples — import JSONL samples (one
/// `{"content_ref": ...}` per line).
async fn import_samples(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: String,
) -> impl IntoResponse {
    match state.engine.import_samples(id, &body) {
        Ok(ids) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "imported": ids.len(), "sample_ids": ids })),
        )
            .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Deserialize)]
struct LabelRequest {
    batch_size: Option<usize>,
    confidence_threshold: Option<f64>,
    human_review: Option<bool>,
}

/// POST /api/projects/:id/label — select a batch and schedule it.
async fn label(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<LabelRequest>,
) -> impl IntoResponse {
    let batch_size = req.batch_size.unwrap_or(10);
    match state.engine.schedule_batch(
        id,
        batch_size,
        req.confidence_threshold,
        req.human_review,
    ) {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "job_id": job_id })),
        )
            .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

/// GET /api/projects/:id/export — lossless JSONL export.
async fn export_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<ExportQuery>,
) -> impl IntoResponse {
    let format = query.format.as_deref().unwrap_or("jsonl");
    if format != "jsonl" {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": format!("unsupported export format '{}'", format)
            })),
        )
            .into_response();
    }
    match state.engine.export(id) {
        Ok(jsonl) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/x-ndjson")],
            jsonl,
        )
            .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}
