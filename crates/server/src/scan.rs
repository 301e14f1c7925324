use std::fmt;
use std::path::PathBuf;

use library::{ScanError, ScanMode, ScanPhase, ScanReport, ScanRequest};
use tracing::{error, info, warn};

use crate::config::resolve_music_root;
use crate::state::AppState;

#[derive(Debug)]
pub enum StartScanError {
    Unconfigured,
    RootMissing(PathBuf),
    Scan(ScanError),
}

impl fmt::Display for StartScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartScanError::Unconfigured => write!(f, "music directory must be set"),
            StartScanError::RootMissing(path) => {
                write!(f, "music directory not found: {}", path.display())
            }
            StartScanError::Scan(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for StartScanError {}

impl From<ScanError> for StartScanError {
    fn from(err: ScanError) -> Self {
        StartScanError::Scan(err)
    }
}

fn music_root(state: &AppState) -> Result<PathBuf, StartScanError> {
    let configured = state.config.read().music_root.clone();
    let root = resolve_music_root(&state.config_path, &configured)
        .ok_or(StartScanError::Unconfigured)?;
    if !root.is_dir() {
        return Err(StartScanError::RootMissing(root));
    }
    Ok(root)
}

/// Starts a background scan of the configured music root. The report is
/// logged from a blocking task once the scan ends.
pub fn start_scan(state: &AppState, mode: ScanMode) -> Result<(), StartScanError> {
    let root = music_root(state)?;
    let handle = state.scanner.start(ScanRequest { root, mode })?;
    tokio::task::spawn_blocking(move || log_report(&handle.wait()));
    Ok(())
}

fn log_report(report: &ScanReport) {
    match report.phase {
        ScanPhase::Completed => info!(
            "Scan finished ({}): {} processed, {} skipped of {} candidates in {} batches",
            report.mode, report.processed, report.skipped, report.candidates, report.batches
        ),
        ScanPhase::Cancelled => warn!(
            "Scan cancelled ({}): {} of {} queued files processed",
            report.mode, report.processed, report.queued
        ),
        _ => error!(
            "Scan failed ({}): {} failed batches, {}",
            report.mode,
            report.failed_batches,
            report.error.as_deref().unwrap_or("unknown error")
        ),
    }
}
