use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Idle,
    Counting,
    Collecting,
    Batching,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ScanPhase {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ScanPhase::Counting | ScanPhase::Collecting | ScanPhase::Batching | ScanPhase::Running
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub phase: ScanPhase,
    pub is_scanning: bool,
    pub total_candidates: usize,
    pub processed: usize,
    pub last_error: Option<String>,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> f64 {
        if self.total_candidates == 0 {
            0.0
        } else {
            self.processed as f64 / self.total_candidates as f64 * 100.0
        }
    }
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            phase: ScanPhase::Idle,
            is_scanning: false,
            total_candidates: 0,
            processed: 0,
            last_error: None,
        }
    }
}

/// Shared scan state. Writers are the coordinator and its workers; every
/// reader gets a consistent copy.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    state: RwLock<ProgressSnapshot>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state.read().clone()
    }

    pub(crate) fn begin(&self) {
        let mut state = self.state.write();
        *state = ProgressSnapshot {
            phase: ScanPhase::Counting,
            is_scanning: true,
            ..ProgressSnapshot::default()
        };
    }

    pub(crate) fn set_phase(&self, phase: ScanPhase) {
        self.state.write().phase = phase;
    }

    pub(crate) fn set_total(&self, total: usize) {
        self.state.write().total_candidates = total;
    }

    /// Counts files whose batch has committed. Returns the new total.
    pub(crate) fn add_processed(&self, count: usize) -> usize {
        let mut state = self.state.write();
        state.processed += count;
        state.processed
    }

    pub(crate) fn record_error(&self, message: impl Into<String>) {
        self.state.write().last_error = Some(message.into());
    }

    pub(crate) fn finish(&self, phase: ScanPhase) {
        let mut state = self.state.write();
        state.phase = phase;
        state.is_scanning = false;
    }

    pub(crate) fn fail(&self, message: impl Into<String>) {
        let mut state = self.state.write();
        state.phase = ScanPhase::Failed;
        state.is_scanning = false;
        state.last_error = Some(message.into());
    }
}
