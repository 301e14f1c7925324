use axum::{extract::State, http::StatusCode, Json};

use crate::state::{AppState, JsonResult, StatsResponse};
use crate::utils::json_error;

pub async fn get_stats(State(state): State<AppState>) -> JsonResult<StatsResponse> {
    let scanner = state.scanner.clone();
    let stats = tokio::task::spawn_blocking(move || scanner.stats())
        .await
        .map_err(|err| json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?
        .map_err(|err| {
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("catalog error: {}", err),
            )
        })?;
    Ok(Json(StatsResponse::new(stats, state.scanner.is_running())))
}
