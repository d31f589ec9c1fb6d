//! HTTP route handlers — the thin command surface over the engine.

pub mod health;
pub mod jobs;
pub mod projects;
pub mod reviews;
pub mod samples;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;

use crate::state::AppState;
use labelforge_core::Error;

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::routes())
        .merge(projects::routes())
        .merge(samples::routes())
        .merge(jobs::routes())
        .merge(reviews::routes())
}

/// Map an engine error to an HTTP response.
pub fn error_response(e: Error) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Config(_) | Error::SchemaViolation(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
        Error::EmptyPool(_) | Error::ConcurrencyConflict(_) => StatusCode::CONFLICT,
        Error::StorageUnavailable(_) | Error::ModelUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": e.to_string() })))
}
