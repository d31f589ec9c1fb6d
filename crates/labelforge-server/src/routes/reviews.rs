//! Human review routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::routes::error_response;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reviews", get(list_reviews))
        .route("/reviews/{id}/resolve", post(resolve_review))
}

/// GET /api/reviews — open review tasks, oldest first.
async fn list_reviews(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.engine.open_reviews() {
        Ok(reviews) => {
            let total = reviews.len();
            Json(serde_json::json!({ "reviews": reviews, "total": total })).into_response()
        }
        Err(e) => error_response(e).into_response(),
    }
}

#[derive(Deserialize)]
struct ResolveRequest {
    reviewer: String,
    /// Approving label; omit to reject the sample outright.
    label: Option<String>,
}

/// POST /api/reviews/:id/resolve — submit the human verdict.
async fn resolve_review(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<ResolveRequest>,
) -> impl IntoResponse {
    match state.engine.resolve_review(id, &req.reviewer, req.label) {
        Ok(task) => Json(serde_json::json!(task)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}
