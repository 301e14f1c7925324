use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use common::AudioFormat;
use metadata::{ExtractMode, ExtractOptions};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::covers::CoverStore;
use crate::error::ScanError;
use crate::optimize::ScanTuning;
use crate::progress::{ProgressSnapshot, ProgressTracker, ScanPhase};
use crate::store::{CatalogStats, CatalogStore};
use crate::writer::{Candidate, CatalogWriter};

const PROGRESS_LOG_EVERY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Thorough extraction of every candidate.
    Full,
    /// Fast extraction of every candidate.
    #[default]
    Fast,
    /// Fast extraction of candidates modified since the last successful scan.
    Incremental,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Full => "full",
            ScanMode::Fast => "fast",
            ScanMode::Incremental => "incremental",
        }
    }

    pub fn extract_mode(&self) -> ExtractMode {
        match self {
            ScanMode::Full => ExtractMode::Thorough,
            ScanMode::Fast | ScanMode::Incremental => ExtractMode::Fast,
        }
    }

    pub fn is_incremental(&self) -> bool {
        matches!(self, ScanMode::Incremental)
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(ScanMode::Full),
            "fast" => Ok(ScanMode::Fast),
            "incremental" => Ok(ScanMode::Incremental),
            other => Err(format!("unknown scan mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub root: PathBuf,
    pub mode: ScanMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub phase: ScanPhase,
    pub mode: ScanMode,
    /// Every audio file found under the root.
    pub candidates: usize,
    /// Files left after the incremental cutoff.
    pub queued: usize,
    pub processed: usize,
    pub skipped: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub marker_advanced: bool,
    pub error: Option<String>,
}

impl ScanReport {
    fn new(mode: ScanMode) -> Self {
        Self {
            phase: ScanPhase::Idle,
            mode,
            candidates: 0,
            queued: 0,
            processed: 0,
            skipped: 0,
            batches: 0,
            failed_batches: 0,
            marker_advanced: false,
            error: None,
        }
    }

    fn failed(mode: ScanMode, message: String) -> Self {
        Self {
            phase: ScanPhase::Failed,
            error: Some(message),
            ..Self::new(mode)
        }
    }
}

/// Owns the catalog, the progress state and the single-scan-at-a-time rule.
#[derive(Clone)]
pub struct Scanner {
    inner: Arc<ScannerInner>,
}

struct ScannerInner {
    store: Arc<dyn CatalogStore>,
    writer: CatalogWriter,
    progress: ProgressTracker,
    running: AtomicBool,
    cancel: Mutex<Option<Arc<AtomicBool>>>,
}

/// Handle to a scan running on its coordinator thread.
pub struct ScanHandle {
    cancel: Arc<AtomicBool>,
    mode: ScanMode,
    join: JoinHandle<ScanReport>,
}

impl ScanHandle {
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub fn wait(self) -> ScanReport {
        match self.join.join() {
            Ok(report) => report,
            Err(_) => ScanReport::failed(self.mode, "scan thread panicked".to_string()),
        }
    }
}

/// Clears the running flag however the scan ends.
struct RunningGuard {
    inner: Arc<ScannerInner>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        *self.inner.cancel.lock() = None;
        self.inner.running.store(false, Ordering::SeqCst);
    }
}

impl Scanner {
    pub fn new(store: Arc<dyn CatalogStore>, covers: CoverStore) -> Self {
        let writer = CatalogWriter::new(store.clone(), covers);
        Self {
            inner: Arc::new(ScannerInner {
                store,
                writer,
                progress: ProgressTracker::new(),
                running: AtomicBool::new(false),
                cancel: Mutex::new(None),
            }),
        }
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.inner.progress.snapshot()
    }

    pub fn stats(&self) -> Result<CatalogStats, ScanError> {
        Ok(self.inner.store.stats()?)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Flags the active scan for cancellation. Returns false when idle.
    pub fn cancel(&self) -> bool {
        match self.inner.cancel.lock().as_ref() {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Starts a scan on a dedicated coordinator thread.
    pub fn start(&self, request: ScanRequest) -> Result<ScanHandle, ScanError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let guard = self.claim(cancel.clone())?;
        let inner = self.inner.clone();
        let thread_cancel = cancel.clone();
        let mode = request.mode;
        let join = thread::Builder::new()
            .name("scan-coordinator".to_string())
            .spawn(move || {
                let _guard = guard;
                execute(&inner, &request, &thread_cancel)
            })?;
        Ok(ScanHandle { cancel, mode, join })
    }

    /// Runs a scan on the calling thread.
    pub fn run(
        &self,
        request: ScanRequest,
        cancel: Arc<AtomicBool>,
    ) -> Result<ScanReport, ScanError> {
        let _guard = self.claim(cancel.clone())?;
        Ok(execute(&self.inner, &request, &cancel))
    }

    fn claim(&self, cancel: Arc<AtomicBool>) -> Result<RunningGuard, ScanError> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ScanError::AlreadyRunning);
        }
        *self.inner.cancel.lock() = Some(cancel);
        Ok(RunningGuard {
            inner: self.inner.clone(),
        })
    }
}

fn execute(inner: &ScannerInner, request: &ScanRequest, cancel: &AtomicBool) -> ScanReport {
    let progress = &inner.progress;
    let mut report = ScanReport::new(request.mode);
    progress.begin();
    info!("Starting {} scan of {:?}", request.mode, request.root);

    if let Err(err) = check_root(&request.root) {
        warn!("Scan aborted: {}", err);
        progress.fail(err.to_string());
        return ScanReport::failed(request.mode, err.to_string());
    }

    let candidates = collect_candidates(&request.root);
    report.candidates = candidates.len();
    progress.set_total(candidates.len());

    progress.set_phase(ScanPhase::Collecting);
    let work = if request.mode.is_incremental() {
        let marker = match inner.store.last_scan() {
            Ok(marker) => marker,
            Err(err) => {
                let message = format!("could not read last scan marker: {}", err);
                warn!("Scan aborted: {}", message);
                progress.fail(message.clone());
                return ScanReport {
                    phase: ScanPhase::Failed,
                    error: Some(message),
                    ..report
                };
            }
        };
        filter_modified_since(candidates, marker)
    } else {
        candidates
    };
    report.queued = work.len();
    info!(
        "Found {} audio files, {} need processing",
        report.candidates,
        report.queued
    );

    let tuning = ScanTuning::select(report.candidates);
    info!(
        "Using batch size {} with {} workers (cover art {})",
        tuning.batch_size,
        tuning.workers,
        if tuning.skip_cover_art { "skipped" } else { "kept" }
    );

    if work.is_empty() {
        info!("No files need processing");
        progress.finish(ScanPhase::Completed);
        report.phase = ScanPhase::Completed;
        return report;
    }

    progress.set_phase(ScanPhase::Batching);
    let batches: Vec<Vec<Candidate>> = work
        .chunks(tuning.batch_size)
        .map(|chunk| chunk.to_vec())
        .collect();
    let options = ExtractOptions {
        mode: request.mode.extract_mode(),
        read_cover_art: !tuning.skip_cover_art,
    };

    progress.set_phase(ScanPhase::Running);
    let batch_count = batches.len();
    let tally = run_batches(inner, batches, tuning, options, cancel);
    report.processed = tally.processed;
    report.skipped = tally.skipped;
    report.batches = tally.batches;
    report.failed_batches = tally.failed_batches;

    // A cancel that lands after the last batch has been taken changes nothing.
    if cancel.load(Ordering::SeqCst) && tally.batches < batch_count {
        info!("Scan cancelled after {} files", report.processed);
        progress.finish(ScanPhase::Cancelled);
        report.phase = ScanPhase::Cancelled;
        return report;
    }

    if tally.failed_batches == 0 {
        match inner.store.set_last_scan(now_millis()) {
            Ok(()) => report.marker_advanced = true,
            Err(err) => warn!("Could not update last scan marker: {}", err),
        }
        report.phase = ScanPhase::Completed;
    } else {
        report.phase = ScanPhase::Failed;
        report.error = progress.snapshot().last_error;
    }
    progress.finish(report.phase);
    info!(
        "Scan finished: {} processed, {} skipped, {}/{} batches failed",
        report.processed,
        report.skipped,
        report.failed_batches,
        report.batches
    );
    report
}

#[derive(Debug, Default)]
struct Tally {
    processed: usize,
    skipped: usize,
    batches: usize,
    failed_batches: usize,
}

impl Tally {
    fn merge(&mut self, other: Tally) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.batches += other.batches;
        self.failed_batches += other.failed_batches;
    }
}

/// Feeds batches through a bounded queue to a fixed pool of workers.
fn run_batches(
    inner: &ScannerInner,
    batches: Vec<Vec<Candidate>>,
    tuning: ScanTuning,
    options: ExtractOptions,
    cancel: &AtomicBool,
) -> Tally {
    let (batch_tx, batch_rx) =
        crossbeam_channel::bounded::<(usize, Vec<Candidate>)>(tuning.queue_depth());
    let mut tally = Tally::default();

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(tuning.workers);
        for worker_idx in 0..tuning.workers {
            let rx = batch_rx.clone();
            let spawned = thread::Builder::new()
                .name(format!("scan-worker-{}", worker_idx))
                .spawn_scoped(scope, move || {
                    let mut local = Tally::default();
                    for (batch_idx, batch) in rx.iter() {
                        if cancel.load(Ordering::SeqCst) {
                            break;
                        }
                        local.merge(process_batch(inner, batch_idx, &batch, options));
                    }
                    local
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => warn!("Could not spawn scan worker {}: {}", worker_idx, err),
            }
        }
        // Disconnection is driven by worker exits from here on.
        drop(batch_rx);

        if handles.is_empty() {
            inner.progress.record_error("no scan workers could be started");
            tally.failed_batches = batches.len();
            return;
        }

        for (batch_idx, batch) in batches.into_iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                break;
            }
            if batch_tx.send((batch_idx, batch)).is_err() {
                break;
            }
        }
        drop(batch_tx);

        for handle in handles {
            match handle.join() {
                Ok(local) => tally.merge(local),
                Err(_) => {
                    warn!("Scan worker panicked");
                    inner.progress.record_error("scan worker panicked");
                    tally.failed_batches += 1;
                }
            }
        }
    });

    tally
}

fn process_batch(
    inner: &ScannerInner,
    batch_idx: usize,
    batch: &[Candidate],
    options: ExtractOptions,
) -> Tally {
    let mut tally = Tally {
        batches: 1,
        ..Tally::default()
    };
    match inner.writer.write_batch(batch, options) {
        Ok(outcome) => {
            let committed = outcome.committed();
            tally.processed = committed;
            tally.skipped = outcome.skipped();
            let total = inner.progress.add_processed(committed);
            if total / PROGRESS_LOG_EVERY > (total - committed) / PROGRESS_LOG_EVERY {
                info!("Processed {} files", total);
            }
        }
        Err(err) => {
            warn!("Batch {} failed: {}", batch_idx, err);
            inner
                .progress
                .record_error(format!("batch {} failed: {}", batch_idx, err));
            tally.failed_batches = 1;
            tally.skipped = batch.len();
        }
    }
    tally
}

/// The root must be a directory whose entries can be listed.
fn check_root(root: &Path) -> Result<(), ScanError> {
    if !root.is_dir() {
        return Err(ScanError::RootMissing(root.to_path_buf()));
    }
    fs::read_dir(root)
        .map(drop)
        .map_err(|err| ScanError::RootUnreadable(root.to_path_buf(), err))
}

/// Walks `root` for audio files in file name order. Unreadable entries are
/// logged and skipped.
fn collect_candidates(root: &Path) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Error accessing path: {}", err);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let format = match AudioFormat::from_path(entry.path()) {
            Some(format) => format,
            None => continue,
        };
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(err) => {
                warn!("Could not stat {:?}: {}", entry.path(), err);
                continue;
            }
        };
        candidates.push(Candidate {
            path: entry.into_path(),
            format,
            size: meta.len(),
            modified_ms: meta.modified().ok().map(system_time_millis),
        });
    }
    candidates
}

/// Keeps candidates modified at or after `marker`. Files with no readable
/// mtime are kept.
fn filter_modified_since(candidates: Vec<Candidate>, marker: Option<u64>) -> Vec<Candidate> {
    let marker = match marker {
        Some(marker) => marker,
        None => return candidates,
    };
    candidates
        .into_iter()
        .filter(|candidate| candidate.modified_ms.map_or(true, |ms| ms >= marker))
        .collect()
}

fn system_time_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_millis() as u64
}

fn now_millis() -> u64 {
    system_time_millis(SystemTime::now())
}
