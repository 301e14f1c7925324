use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::Json;
use library::{CatalogStats, ProgressSnapshot, ScanMode, ScanPhase, Scanner};
use parking_lot::RwLock;
use serde::Serialize;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub config_path: PathBuf,
    pub config: Arc<RwLock<ServerConfig>>,
    pub scanner: Scanner,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct ScanStartedResponse {
    pub status: &'static str,
    pub mode: ScanMode,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Serialize)]
pub struct ProgressResponse {
    pub phase: ScanPhase,
    pub is_scanning: bool,
    pub total_candidates: usize,
    pub processed: usize,
    pub percent: f64,
    pub last_error: Option<String>,
}

impl From<ProgressSnapshot> for ProgressResponse {
    fn from(snapshot: ProgressSnapshot) -> Self {
        let percent = snapshot.percent();
        Self {
            phase: snapshot.phase,
            is_scanning: snapshot.is_scanning,
            total_candidates: snapshot.total_candidates,
            processed: snapshot.processed,
            percent,
            last_error: snapshot.last_error,
        }
    }
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub artists: usize,
    pub albums: usize,
    pub tracks: usize,
    pub is_scanning: bool,
}

impl StatsResponse {
    pub fn new(stats: CatalogStats, is_scanning: bool) -> Self {
        Self {
            artists: stats.artists,
            albums: stats.albums,
            tracks: stats.tracks,
            is_scanning,
        }
    }
}

pub type JsonResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;
