pub mod scan;
pub mod stats;

use axum::{
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::state::{AppState, HealthResponse};

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/scan", post(scan::start_scan))
        .route("/scan/progress", get(scan::get_progress))
        .route("/scan/cancel", post(scan::cancel_scan))
        .route("/stats", get(stats::get_stats))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}
