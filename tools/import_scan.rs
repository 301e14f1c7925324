use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use library::{CoverStore, RedbCatalog, ScanMode, ScanPhase, ScanRequest, Scanner};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Scans a music directory into the catalog and prints the resulting counts.
#[derive(Parser, Debug)]
#[command(name = "import_scan")]
struct Args {
    /// Directory to scan
    #[arg(env = "MUSIC_ROOT")]
    music_root: PathBuf,

    /// Catalog database file
    #[arg(long, env = "INDEX_PATH", default_value = "data/library.redb")]
    index: PathBuf,

    /// Directory for extracted album artwork
    #[arg(long, env = "COVERS_PATH", default_value = "data/covers")]
    covers: PathBuf,

    /// fast, full or incremental
    #[arg(long, default_value_t = ScanMode::Fast)]
    mode: ScanMode,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let catalog = Arc::new(RedbCatalog::open(&args.index)?);
    let scanner = Scanner::new(catalog, CoverStore::new(args.covers));

    let before = scanner.stats()?;
    info!(
        "Before: {} artists, {} albums, {} tracks",
        before.artists, before.albums, before.tracks
    );

    let report = scanner.run(
        ScanRequest {
            root: args.music_root,
            mode: args.mode,
        },
        Arc::new(AtomicBool::new(false)),
    )?;

    let after = scanner.stats()?;
    info!(
        "After: {} artists, {} albums, {} tracks ({} processed, {} skipped, {} failed batches)",
        after.artists,
        after.albums,
        after.tracks,
        report.processed,
        report.skipped,
        report.failed_batches
    );

    if report.phase == ScanPhase::Failed {
        let message = report.error.unwrap_or_else(|| "scan failed".to_string());
        error!("Scan failed: {}", message);
        return Err(message.into());
    }
    Ok(())
}
