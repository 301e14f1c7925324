//! The catalog store seam: artists, albums and tracks behind batch
//! transactions, plus the last-scan marker.

mod redb_catalog;

use common::{Album, Artist, Track};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use redb_catalog::RedbCatalog;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub artists: usize,
    pub albums: usize,
    pub tracks: usize,
}

pub trait CatalogStore: Send + Sync {
    /// Opens a write transaction. Only one is live at a time per store;
    /// callers block until the previous one commits or aborts.
    fn begin(&self) -> Result<Box<dyn CatalogTxn>, StoreError>;

    /// Milliseconds since the Unix epoch of the last fully successful scan.
    fn last_scan(&self) -> Result<Option<u64>, StoreError>;

    fn set_last_scan(&self, millis: u64) -> Result<(), StoreError>;

    fn stats(&self) -> Result<CatalogStats, StoreError>;
}

/// One batch's unit of work. Dropping it without `commit` discards every
/// write made through it.
pub trait CatalogTxn {
    /// Exact lookup on the normalized name.
    fn artist_by_name(&self, name: &str) -> Result<Option<Artist>, StoreError>;

    /// Inserts the artist unless one with the same name already exists.
    fn insert_artist(&mut self, artist: &Artist) -> Result<(), StoreError>;

    fn album_by_name(&self, artist_id: &str, name: &str) -> Result<Option<Album>, StoreError>;

    /// Inserts or replaces the album row and its name index entry.
    fn put_album(&mut self, album: &Album) -> Result<(), StoreError>;

    /// Inserts or fully overwrites the track keyed by its file path.
    fn upsert_track(&mut self, track: &Track) -> Result<(), StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;

    fn abort(self: Box<Self>) -> Result<(), StoreError>;
}
