use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use library::{ScanError, ScanMode};
use serde::Deserialize;

use crate::scan::StartScanError;
use crate::state::{AppState, CancelResponse, ProgressResponse, ScanStartedResponse};
use crate::utils::json_error_response;

#[derive(Debug, Default, Deserialize)]
pub struct ScanQuery {
    pub mode: Option<String>,
}

pub async fn start_scan(State(state): State<AppState>, Query(query): Query<ScanQuery>) -> Response {
    let requested = query
        .mode
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let mode = match requested {
        Some(value) => match value.parse::<ScanMode>() {
            Ok(mode) => mode,
            Err(err) => return json_error_response(StatusCode::BAD_REQUEST, err),
        },
        None => state.config.read().default_scan_mode,
    };

    match crate::scan::start_scan(&state, mode) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(ScanStartedResponse {
                status: "started",
                mode,
            }),
        )
            .into_response(),
        Err(StartScanError::Scan(ScanError::AlreadyRunning)) => {
            json_error_response(StatusCode::CONFLICT, "a scan is already running")
        }
        Err(err @ (StartScanError::Unconfigured | StartScanError::RootMissing(_))) => {
            json_error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
        Err(err) => json_error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

pub async fn get_progress(State(state): State<AppState>) -> Json<ProgressResponse> {
    Json(ProgressResponse::from(state.scanner.progress()))
}

pub async fn cancel_scan(State(state): State<AppState>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.scanner.cancel(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use library::{CoverStore, RedbCatalog, ScanPhase, Scanner};
    use parking_lot::RwLock;

    use crate::api::stats::get_stats;
    use crate::config::ServerConfig;

    fn app_state(dir: &Path, music_root: &str) -> AppState {
        let catalog = Arc::new(RedbCatalog::open(&dir.join("library.redb")).unwrap());
        let scanner = Scanner::new(catalog, CoverStore::new(dir.join("covers")));
        AppState {
            config_path: dir.join("config.yaml"),
            config: Arc::new(RwLock::new(ServerConfig {
                music_root: music_root.to_string(),
                ..ServerConfig::default()
            })),
            scanner,
        }
    }

    fn query(mode: Option<&str>) -> Query<ScanQuery> {
        Query(ScanQuery {
            mode: mode.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn unconfigured_music_root_is_a_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(dir.path(), "");
        let response = start_scan(State(state), query(None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_music_root_is_a_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(dir.path(), "nowhere");
        let response = start_scan(State(state.clone()), query(Some("full"))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!state.scanner.is_running());
    }

    #[tokio::test]
    async fn unknown_mode_is_a_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("music")).unwrap();
        let state = app_state(dir.path(), "music");
        let response = start_scan(State(state.clone()), query(Some("turbo"))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!state.scanner.is_running());
    }

    #[tokio::test]
    async fn scan_runs_to_completion_in_the_background() {
        let dir = tempfile::tempdir().unwrap();
        let music = dir.path().join("music/Album");
        std::fs::create_dir_all(&music).unwrap();
        std::fs::write(music.join("01 Intro.mp3"), vec![0u8; 3200]).unwrap();
        std::fs::write(music.join("02 Outro.mp3"), vec![0u8; 3200]).unwrap();
        let state = app_state(dir.path(), "music");

        let response = start_scan(State(state.clone()), query(Some("fast"))).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let mut progress = get_progress(State(state.clone())).await.0;
        for _ in 0..500 {
            if !progress.is_scanning && !state.scanner.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            progress = get_progress(State(state.clone())).await.0;
        }
        assert_eq!(progress.phase, ScanPhase::Completed);
        assert_eq!(progress.total_candidates, 2);
        assert_eq!(progress.processed, 2);
        assert_eq!(progress.percent, 100.0);

        let stats = get_stats(State(state.clone())).await.ok().unwrap().0;
        assert_eq!((stats.artists, stats.albums, stats.tracks), (1, 1, 2));
        assert!(!stats.is_scanning);
    }

    #[tokio::test]
    async fn cancel_when_idle_reports_nothing_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(dir.path(), "");
        let response = cancel_scan(State(state)).await.0;
        assert!(!response.cancelled);
    }
}
