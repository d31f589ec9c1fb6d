//! Sample routes: inspection and provenance.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::routes::error_response;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/samples/{id}", get(get_sample))
        .route("/samples/{id}/history", get(get_history))
}

/// GET /api/samples/:id — sample with its annotations.
async fn get_sample(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let sample = match state.engine.store().get_sample(id) {
        Ok(Some(s)) => s,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": "Sample not found" })),
            )
                .into_response()
        }
        Err(e) => return error_response(e).into_response(),
    };
    let annotations = match state.engine.store().annotations_for_sample(id) {
        Ok(a) => a,
        Err(e) => return error_response(e).into_response(),
    };
    Json(serde_json::json!({ "sample": sample, "annotations": annotations })).into_response()
}

/// GET /api/samples/:id/history — full audit trail, oldest first.
async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.engine.history(id) {
        Ok(history) => Json(serde_json::json!({ "history": history })).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}
