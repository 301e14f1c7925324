use serde::Serialize;

/// Batch and pool sizing picked from the candidate count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanTuning {
    pub batch_size: usize,
    pub workers: usize,
    pub skip_cover_art: bool,
}

impl ScanTuning {
    pub fn select(total_candidates: usize) -> Self {
        if total_candidates > 100_000 {
            Self {
                batch_size: 500,
                workers: 8,
                skip_cover_art: true,
            }
        } else if total_candidates > 10_000 {
            Self {
                batch_size: 200,
                workers: 6,
                skip_cover_art: false,
            }
        } else {
            Self {
                batch_size: 50,
                workers: 2,
                skip_cover_art: false,
            }
        }
    }

    /// Capacity of the batch queue between the producer and the workers.
    pub fn queue_depth(&self) -> usize {
        self.workers * 2
    }
}
