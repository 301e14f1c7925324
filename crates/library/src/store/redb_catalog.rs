use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::{Album, Artist, Track};
use redb::{Database, ReadableTable, TableDefinition, TableError, WriteTransaction};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{CatalogStats, CatalogStore, CatalogTxn};
use crate::error::StoreError;

const INDEX_VERSION: u32 = 1;
const KEY_SEP: char = '\x1f';

type RowTable = TableDefinition<'static, &'static str, &'static [u8]>;

const META_TABLE: RowTable = TableDefinition::new("meta");
const ARTISTS_TABLE: RowTable = TableDefinition::new("artists");
const ARTISTS_BY_NAME_TABLE: RowTable = TableDefinition::new("artists_by_name");
const ALBUMS_TABLE: RowTable = TableDefinition::new("albums");
const ALBUMS_BY_NAME_TABLE: RowTable = TableDefinition::new("albums_by_name");
const TRACKS_TABLE: RowTable = TableDefinition::new("tracks");

const CATALOG_TABLES: [RowTable; 5] = [
    ARTISTS_TABLE,
    ARTISTS_BY_NAME_TABLE,
    ALBUMS_TABLE,
    ALBUMS_BY_NAME_TABLE,
    TRACKS_TABLE,
];

const META_VERSION_KEY: &str = "version";
const META_LAST_SCAN_KEY: &str = "last_scan";

/// Catalog kept in a single redb file. Rows are bincode encoded; the
/// `*_by_name` tables and path-keyed `tracks` act as uniqueness constraints.
#[derive(Clone)]
pub struct RedbCatalog {
    db: Arc<Database>,
}

impl RedbCatalog {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = open_or_create_db(path)?;
        let catalog = Self { db: Arc::new(db) };
        catalog.prepare()?;
        info!("Opened catalog at {:?}", path);
        Ok(catalog)
    }

    /// Creates missing tables and drops catalog rows written by another
    /// index version.
    fn prepare(&self) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        let version: Option<u32> = {
            let meta = write_txn.open_table(META_TABLE)?;
            let stored = match meta.get(META_VERSION_KEY)? {
                Some(value) => Some(decode_value(value.value())?),
                None => None,
            };
            stored
        };

        if let Some(version) = version {
            if version != INDEX_VERSION {
                warn!("Catalog version mismatch ({}); clearing", version);
                for table in CATALOG_TABLES {
                    clear_table(&write_txn, table)?;
                }
                clear_table(&write_txn, META_TABLE)?;
            }
        }

        for table in CATALOG_TABLES {
            write_txn.open_table(table)?;
        }
        {
            let mut meta = write_txn.open_table(META_TABLE)?;
            meta.insert(META_VERSION_KEY, encode_value(&INDEX_VERSION)?.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn track_by_path(&self, file_path: &str) -> Result<Option<Track>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRACKS_TABLE)?;
        let track = match table.get(file_path)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(track)
    }

    pub fn albums(&self) -> Result<Vec<Album>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ALBUMS_TABLE)?;
        let mut albums = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            albums.push(decode_value(value.value())?);
        }
        Ok(albums)
    }
}

impl CatalogStore for RedbCatalog {
    fn begin(&self) -> Result<Box<dyn CatalogTxn>, StoreError> {
        let txn = self.db.begin_write()?;
        Ok(Box::new(RedbTxn { txn }))
    }

    fn last_scan(&self) -> Result<Option<u64>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(META_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let marker = match table.get(META_LAST_SCAN_KEY)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(marker)
    }

    fn set_last_scan(&self, millis: u64) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(META_TABLE)?;
            table.insert(META_LAST_SCAN_KEY, encode_value(&millis)?.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn stats(&self) -> Result<CatalogStats, StoreError> {
        let read_txn = self.db.begin_read()?;
        let mut counts = [0usize; 3];
        for (slot, def) in [ARTISTS_TABLE, ALBUMS_TABLE, TRACKS_TABLE].into_iter().enumerate() {
            counts[slot] = match read_txn.open_table(def) {
                Ok(table) => table.iter()?.count(),
                Err(TableError::TableDoesNotExist(_)) => 0,
                Err(err) => return Err(err.into()),
            };
        }
        Ok(CatalogStats {
            artists: counts[0],
            albums: counts[1],
            tracks: counts[2],
        })
    }
}

struct RedbTxn {
    txn: WriteTransaction,
}

impl RedbTxn {
    fn get_row<T: for<'de> Deserialize<'de>>(
        &self,
        def: RowTable,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let table = self.txn.open_table(def)?;
        let row = match table.get(key)? {
            Some(value) => Some(decode_value(value.value())?),
            None => None,
        };
        Ok(row)
    }

    /// Follows a name index entry to the row it points at.
    fn get_indexed<T: for<'de> Deserialize<'de>>(
        &self,
        index: RowTable,
        rows: RowTable,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let id = {
            let table = self.txn.open_table(index)?;
            let id = match table.get(key)? {
                Some(value) => String::from_utf8(value.value().to_vec())
                    .map_err(|_| StoreError::Corrupt(key.to_string()))?,
                None => return Ok(None),
            };
            id
        };
        self.get_row(rows, &id)
    }

    fn put(&self, def: RowTable, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut table = self.txn.open_table(def)?;
        table.insert(key, value)?;
        Ok(())
    }
}

impl CatalogTxn for RedbTxn {
    fn artist_by_name(&self, name: &str) -> Result<Option<Artist>, StoreError> {
        self.get_indexed(ARTISTS_BY_NAME_TABLE, ARTISTS_TABLE, name)
    }

    fn insert_artist(&mut self, artist: &Artist) -> Result<(), StoreError> {
        if self.artist_by_name(&artist.name)?.is_some() {
            return Ok(());
        }
        self.put(ARTISTS_TABLE, &artist.id, &encode_value(artist)?)?;
        self.put(ARTISTS_BY_NAME_TABLE, &artist.name, artist.id.as_bytes())
    }

    fn album_by_name(&self, artist_id: &str, name: &str) -> Result<Option<Album>, StoreError> {
        self.get_indexed(
            ALBUMS_BY_NAME_TABLE,
            ALBUMS_TABLE,
            &album_name_key(artist_id, name),
        )
    }

    fn put_album(&mut self, album: &Album) -> Result<(), StoreError> {
        self.put(ALBUMS_TABLE, &album.id, &encode_value(album)?)?;
        self.put(
            ALBUMS_BY_NAME_TABLE,
            &album_name_key(&album.artist_id, &album.name),
            album.id.as_bytes(),
        )
    }

    fn upsert_track(&mut self, track: &Track) -> Result<(), StoreError> {
        self.put(TRACKS_TABLE, &track.file_path, &encode_value(track)?)
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.txn.commit()?;
        Ok(())
    }

    fn abort(self: Box<Self>) -> Result<(), StoreError> {
        self.txn.abort()?;
        Ok(())
    }
}

fn open_or_create_db(path: &Path) -> Result<Database, StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    if path.exists() {
        Ok(Database::open(path)?)
    } else {
        Ok(Database::create(path)?)
    }
}

fn clear_table(txn: &WriteTransaction, table: RowTable) -> Result<(), StoreError> {
    match txn.delete_table(table) {
        Ok(_) => Ok(()),
        Err(TableError::TableDoesNotExist(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn album_name_key(artist_id: &str, name: &str) -> String {
    let mut key = String::with_capacity(artist_id.len() + name.len() + 1);
    key.push_str(artist_id);
    key.push(KEY_SEP);
    key.push_str(name);
    key
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}
