//! Library scanning: walks a music root, extracts each audio file and
//! writes artists, albums and tracks into the catalog in batches.

mod covers;
mod error;
pub mod normalize;
mod optimize;
mod progress;
mod scanner;
pub mod store;
mod writer;

pub use covers::CoverStore;
pub use error::{LibraryError, ScanError, StoreError};
pub use optimize::ScanTuning;
pub use progress::{ProgressSnapshot, ProgressTracker, ScanPhase};
pub use scanner::{ScanHandle, ScanMode, ScanReport, ScanRequest, Scanner};
pub use store::{CatalogStats, CatalogStore, CatalogTxn, RedbCatalog};
pub use writer::{BatchOutcome, Candidate, CatalogWriter, ItemOutcome};
