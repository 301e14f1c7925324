use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use common::{
    stable_id, Album, Artist, AudioFormat, Track, UNKNOWN_ALBUM, UNKNOWN_ARTIST, UNKNOWN_GENRE,
};
use metadata::{extract_track, ExtractOptions, RawTrack};
use tracing::{debug, warn};

use crate::covers::CoverStore;
use crate::error::{LibraryError, StoreError};
use crate::normalize;
use crate::store::{CatalogStore, CatalogTxn};

const KEY_SEP: char = '\x1f';
const UNTITLED: &str = "Unknown";

/// A file picked up by the walk.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub path: PathBuf,
    pub format: AudioFormat,
    pub size: u64,
    /// Modification time in milliseconds since the Unix epoch.
    pub modified_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Committed,
    Skipped(String),
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub items: Vec<(PathBuf, ItemOutcome)>,
}

impl BatchOutcome {
    pub fn committed(&self) -> usize {
        self.items
            .iter()
            .filter(|(_, outcome)| *outcome == ItemOutcome::Committed)
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.items.len() - self.committed()
    }
}

/// Turns a batch of candidates into catalog rows inside one transaction.
#[derive(Clone)]
pub struct CatalogWriter {
    store: Arc<dyn CatalogStore>,
    covers: CoverStore,
}

impl CatalogWriter {
    pub fn new(store: Arc<dyn CatalogStore>, covers: CoverStore) -> Self {
        Self { store, covers }
    }

    /// Extracts every file, then applies the results in one transaction.
    /// Per-file problems become [`ItemOutcome::Skipped`]; only a failure to
    /// open or commit the transaction is returned as an error, in which case
    /// nothing from the batch persists.
    pub fn write_batch(
        &self,
        batch: &[Candidate],
        options: ExtractOptions,
    ) -> Result<BatchOutcome, StoreError> {
        let mut albums_with_cover = HashSet::new();
        let extracted: Vec<_> = batch
            .iter()
            .map(|candidate| {
                let result =
                    extract_track(&candidate.path, candidate.format, candidate.size, options)
                        .map(|mut raw| {
                            drop_repeated_cover(&mut albums_with_cover, &mut raw);
                            raw
                        });
                (candidate.path.clone(), result)
            })
            .collect();

        let mut txn = self.store.begin()?;
        let mut outcome = BatchOutcome {
            items: Vec::with_capacity(extracted.len()),
        };
        for (path, result) in extracted {
            let applied = result
                .map_err(LibraryError::from)
                .and_then(|raw| self.apply(txn.as_mut(), raw, options.read_cover_art));
            let item = match applied {
                Ok(()) => ItemOutcome::Committed,
                Err(err) => {
                    warn!("Skipping {:?}: {}", path, err);
                    ItemOutcome::Skipped(err.to_string())
                }
            };
            outcome.items.push((path, item));
        }
        txn.commit()?;
        Ok(outcome)
    }

    fn apply(
        &self,
        txn: &mut dyn CatalogTxn,
        raw: RawTrack,
        with_cover: bool,
    ) -> Result<(), LibraryError> {
        let artist = resolve_artist(txn, &raw.artist)?;

        let album_name = normalize::name_or(&raw.album, UNKNOWN_ALBUM);
        let (mut album, mut dirty) = match txn.album_by_name(&artist.id, &album_name)? {
            Some(album) => (album, false),
            None => {
                let album = Album {
                    id: stable_id(&format!("{}{}{}", artist.id, KEY_SEP, album_name)),
                    artist_id: artist.id.clone(),
                    name: album_name,
                    year: raw.year,
                    genre: normalize::genre_or(&raw.genre, UNKNOWN_GENRE),
                    cover_art_path: None,
                };
                (album, true)
            }
        };

        if with_cover && album.cover_art_path.is_none() {
            if let Some(cover) = &raw.cover_art {
                match self.covers.save(&album.name, &artist.id, cover) {
                    Ok(path) => {
                        album.cover_art_path = Some(path);
                        dirty = true;
                    }
                    Err(err) => warn!("Could not save cover art for {:?}: {}", album.name, err),
                }
            }
        }
        if dirty {
            txn.put_album(&album)?;
        }

        let file_path = raw.path.to_string_lossy().to_string();
        let track = Track {
            id: stable_id(&file_path),
            title: track_title(&raw),
            artist_id: artist.id,
            album_id: album.id,
            track_number: normalize::track_number(raw.track_number),
            duration_secs: normalize::duration_secs(raw.duration),
            file_path,
            file_size: raw.size,
            bitrate: normalize::bitrate(raw.bitrate),
            format: raw.format,
        };
        txn.upsert_track(&track)?;
        debug!("Upserted {:?}", track.file_path);
        Ok(())
    }
}

/// Keeps artwork bytes for the first track of each album in a batch only;
/// later tracks of that album could not replace it anyway.
fn drop_repeated_cover(seen: &mut HashSet<(String, String)>, raw: &mut RawTrack) {
    if raw.cover_art.is_none() {
        return;
    }
    let key = (
        normalize::name_or(&raw.artist, UNKNOWN_ARTIST),
        normalize::name_or(&raw.album, UNKNOWN_ALBUM),
    );
    if !seen.insert(key) {
        raw.cover_art = None;
    }
}

fn resolve_artist(txn: &mut dyn CatalogTxn, raw_name: &str) -> Result<Artist, StoreError> {
    let name = normalize::name_or(raw_name, UNKNOWN_ARTIST);
    if let Some(artist) = txn.artist_by_name(&name)? {
        return Ok(artist);
    }
    let artist = Artist {
        id: stable_id(&name),
        name,
    };
    txn.insert_artist(&artist)?;
    Ok(artist)
}

fn track_title(raw: &RawTrack) -> String {
    let title = normalize::clean_string(&raw.title, normalize::MAX_NAME_BYTES);
    if !title.is_empty() {
        return title;
    }
    let stem = raw
        .path
        .file_stem()
        .map(|s| normalize::clean_string(&s.to_string_lossy(), normalize::MAX_NAME_BYTES))
        .unwrap_or_default();
    if stem.is_empty() {
        UNTITLED.to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::faulty::FaultyStore;
    use crate::store::{CatalogStats, RedbCatalog};
    use metadata::{CoverArt, ExtractMode};
    use std::path::Path;

    fn setup() -> (tempfile::TempDir, Arc<RedbCatalog>) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(RedbCatalog::open(&dir.path().join("catalog.redb")).unwrap());
        (dir, catalog)
    }

    fn write_files(root: &Path, count: usize) -> Vec<Candidate> {
        std::fs::create_dir_all(root).unwrap();
        (1..=count)
            .map(|i| {
                let path = root.join(format!("{:02} Song.mp3", i));
                std::fs::write(&path, vec![0u8; 1600]).unwrap();
                Candidate {
                    path,
                    format: AudioFormat::Mp3,
                    size: 1600,
                    modified_ms: None,
                }
            })
            .collect()
    }

    fn fast() -> ExtractOptions {
        ExtractOptions {
            mode: ExtractMode::Fast,
            read_cover_art: false,
        }
    }

    #[test]
    fn one_failing_file_does_not_roll_back_the_batch() {
        let (dir, catalog) = setup();
        let batch = write_files(&dir.path().join("music"), 10);
        let failing = batch[4].path.to_string_lossy().to_string();
        let store = Arc::new(FaultyStore::new(catalog.clone()).fail_track(&failing));
        let writer = CatalogWriter::new(store, CoverStore::new(dir.path().join("covers")));

        let outcome = writer.write_batch(&batch, fast()).unwrap();

        assert_eq!(outcome.committed(), 9);
        assert_eq!(outcome.skipped(), 1);
        assert!(matches!(outcome.items[4].1, ItemOutcome::Skipped(_)));
        assert_eq!(catalog.stats().unwrap().tracks, 9);
        assert!(catalog.track_by_path(&failing).unwrap().is_none());
    }

    #[test]
    fn commit_failure_persists_nothing() {
        let (dir, catalog) = setup();
        let batch = write_files(&dir.path().join("music"), 3);
        let store = Arc::new(FaultyStore::new(catalog.clone()).fail_commits());
        let writer = CatalogWriter::new(store, CoverStore::new(dir.path().join("covers")));

        let result = writer.write_batch(&batch, fast());

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(catalog.stats().unwrap(), CatalogStats::default());
    }

    #[test]
    fn unreadable_file_is_skipped() {
        let (dir, catalog) = setup();
        let mut batch = write_files(&dir.path().join("music"), 2);
        batch.insert(
            1,
            Candidate {
                path: dir.path().join("music/missing.mp3"),
                format: AudioFormat::Mp3,
                size: 10,
                modified_ms: None,
            },
        );
        let covers = CoverStore::new(dir.path().join("covers"));
        let writer = CatalogWriter::new(catalog.clone(), covers);

        let outcome = writer.write_batch(&batch, fast()).unwrap();

        assert_eq!(outcome.committed(), 2);
        assert!(matches!(outcome.items[1].1, ItemOutcome::Skipped(_)));
    }

    #[test]
    fn untagged_files_land_under_unknown_artist() {
        let (dir, catalog) = setup();
        let batch = write_files(&dir.path().join("music"), 2);
        let covers = CoverStore::new(dir.path().join("covers"));
        let writer = CatalogWriter::new(catalog.clone(), covers);

        writer.write_batch(&batch, fast()).unwrap();
        writer.write_batch(&batch, fast()).unwrap();

        let stats = catalog.stats().unwrap();
        assert_eq!((stats.artists, stats.albums, stats.tracks), (1, 1, 2));
        let albums = catalog.albums().unwrap();
        assert_eq!(albums[0].name, UNKNOWN_ALBUM);
        assert_eq!(albums[0].genre, UNKNOWN_GENRE);
        assert_eq!(albums[0].artist_id, stable_id(UNKNOWN_ARTIST));

        let path = batch[0].path.to_string_lossy().to_string();
        let track = catalog.track_by_path(&path).unwrap().unwrap();
        assert_eq!(track.title, "01 Song");
        assert_eq!(track.bitrate, 192);
        assert_eq!(track.track_number, 0);
        assert_eq!(track.format, AudioFormat::Mp3);
    }

    fn raw_track(path: &str, album: &str, cover: Option<CoverArt>) -> RawTrack {
        RawTrack {
            path: PathBuf::from(path),
            format: AudioFormat::Mp3,
            size: 0,
            title: String::new(),
            artist: "Band".to_string(),
            album: album.to_string(),
            genre: String::new(),
            year: 0,
            track_number: 0,
            duration: std::time::Duration::ZERO,
            bitrate: 0,
            cover_art: cover,
            tagged: true,
            estimated: true,
        }
    }

    fn apply_one(writer: &CatalogWriter, catalog: &RedbCatalog, raw: RawTrack, with_cover: bool) {
        let mut txn = catalog.begin().unwrap();
        writer.apply(txn.as_mut(), raw, with_cover).unwrap();
        txn.commit().unwrap();
    }

    #[test]
    fn title_falls_back_to_stem() {
        let mut raw = raw_track("/m/Intro \0.mp3", "", None);
        raw.title = " \u{fffd} ".to_string();
        assert_eq!(track_title(&raw), "Intro");
    }

    #[test]
    fn cover_is_written_once_per_album() {
        let (dir, catalog) = setup();
        let covers = CoverStore::new(dir.path().join("covers"));
        let writer = CatalogWriter::new(catalog.clone(), covers);
        let first = CoverArt::new(vec![0xFF, 0xD8, 0xFF, 0x01]);
        let second = CoverArt::new(vec![0xFF, 0xD8, 0xFF, 0x02]);

        apply_one(&writer, &catalog, raw_track("/m/1.mp3", "Debut", Some(first.clone())), true);
        let albums = catalog.albums().unwrap();
        let saved = albums[0].cover_art_path.clone().unwrap();
        assert!(saved.ends_with(&format!("Debut_{}.jpg", stable_id("Band"))));
        assert_eq!(std::fs::read(&saved).unwrap(), first.data);

        apply_one(&writer, &catalog, raw_track("/m/2.mp3", "Debut", Some(second)), true);
        let albums = catalog.albums().unwrap();
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].cover_art_path.as_deref(), Some(saved.as_str()));
        assert_eq!(std::fs::read(&saved).unwrap(), first.data);
    }

    #[test]
    fn cover_is_skipped_when_policy_says_so() {
        let (dir, catalog) = setup();
        let covers_dir = dir.path().join("covers");
        let writer = CatalogWriter::new(catalog.clone(), CoverStore::new(&covers_dir));
        let cover = CoverArt::new(vec![0x89, 0x50, 0x4E, 0x47]);

        apply_one(&writer, &catalog, raw_track("/m/1.mp3", "Debut", Some(cover)), false);

        let albums = catalog.albums().unwrap();
        assert_eq!(albums.len(), 1);
        assert!(albums[0].cover_art_path.is_none());
        assert!(!covers_dir.exists());
    }

    #[test]
    fn later_album_tracks_in_a_batch_drop_cover_bytes() {
        let cover = || Some(CoverArt::new(vec![0xFF, 0xD8, 0xFF, 0x00]));
        let mut seen = HashSet::new();
        let mut tracks = vec![
            raw_track("/m/1.mp3", "Debut", None),
            raw_track("/m/2.mp3", "Debut", cover()),
            raw_track("/m/3.mp3", " Debut ", cover()),
            raw_track("/m/4.mp3", "Second", cover()),
        ];
        for raw in &mut tracks {
            drop_repeated_cover(&mut seen, raw);
        }
        let kept: Vec<bool> = tracks.iter().map(|raw| raw.cover_art.is_some()).collect();
        assert_eq!(kept, vec![false, true, false, true]);
    }
}
