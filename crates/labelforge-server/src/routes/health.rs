//! Health and status routes.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::routes::error_response;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

/// GET /api/health — liveness plus engine and store status.
async fn get_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.engine.status() {
        Ok(status) => Json(serde_json::json!({
            "status": "ok",
            "activeJobs": status.active_jobs,
            "pool": {
                "inUse": status.pool_in_use,
                "capacity": status.pool_capacity,
            },
            "store": status.store,
        }))
        .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}
