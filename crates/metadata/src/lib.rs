//! Per-file extraction: embedded tags through lofty plus duration and
//! bitrate measured from the container bytes.

pub mod properties;
mod tags;

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::AudioFormat;
use lofty::error::LoftyError;

pub use properties::{
    estimate_by_size, extract_properties, read_properties, AudioProperties, ExtractMode,
};
pub use tags::{read_tags, BasicMetadata, CoverArt, TagMetadata, TrackTags};

/// Embedded pictures above this size are dropped.
pub const MAX_COVER_ART_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    pub mode: ExtractMode,
    pub read_cover_art: bool,
}

/// Everything extracted from one file, before normalization.
#[derive(Debug, Clone)]
pub struct RawTrack {
    pub path: PathBuf,
    pub format: AudioFormat,
    pub size: u64,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub year: i32,
    pub track_number: u32,
    pub duration: Duration,
    pub bitrate: u32,
    pub cover_art: Option<CoverArt>,
    /// False when tag reading failed and defaults were substituted.
    pub tagged: bool,
    /// True when duration and bitrate are a flat estimate.
    pub estimated: bool,
}

/// Extracts one file. Only an unopenable file is an error; tag and
/// container problems degrade to defaults and estimates.
pub fn extract_track(
    path: &Path,
    format: AudioFormat,
    size: u64,
    options: ExtractOptions,
) -> Result<RawTrack, MetadataError> {
    drop(File::open(path)?);

    let tags = TrackTags::read(path, options.read_cover_art);
    let props = extract_properties(path, format, size, options.mode);
    let tagged = tags.is_tagged();

    let title = tags.title().to_string();
    let artist = tags.artist().to_string();
    let album = tags.album().to_string();
    let genre = tags.genre().to_string();
    let year = tags.year();
    let track_number = tags.track_no();
    let cover_art = tags.into_cover().filter(|cover| {
        let keep = cover_within_limit(cover);
        if !keep {
            tracing::debug!(
                "Dropping {} byte cover from {:?}",
                cover.data.len(),
                path
            );
        }
        keep
    });

    Ok(RawTrack {
        path: path.to_path_buf(),
        format,
        size,
        title,
        artist,
        album,
        genre,
        year,
        track_number,
        duration: props.duration,
        bitrate: props.bitrate,
        cover_art,
        tagged,
        estimated: props.estimated,
    })
}

fn cover_within_limit(cover: &CoverArt) -> bool {
    !cover.data.is_empty() && cover.data.len() <= MAX_COVER_ART_BYTES
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{UNKNOWN_ALBUM, UNKNOWN_ARTIST, UNKNOWN_GENRE};

    #[test]
    fn missing_file_is_an_error() {
        let result = extract_track(
            Path::new("/nonexistent/a.mp3"),
            AudioFormat::Mp3,
            1000,
            ExtractOptions::default(),
        );
        assert!(matches!(result, Err(MetadataError::Io(_))));
    }

    #[test]
    fn untagged_wav_uses_defaults_and_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Field Recording.wav");
        let mut data = b"RIFF\0\0\0\0WAVE".to_vec();
        data.extend_from_slice(b"fmt ");
        data.extend_from_slice(&16u32.to_le_bytes());
        data.extend_from_slice(&[1, 0, 2, 0]);
        data.extend_from_slice(&44_100u32.to_le_bytes());
        data.extend_from_slice(&176_400u32.to_le_bytes());
        data.extend_from_slice(&[4, 0, 16, 0]);
        std::fs::write(&path, &data).unwrap();

        let size = 44 + 176_400 * 5;
        let track = extract_track(
            &path,
            AudioFormat::Wav,
            size,
            ExtractOptions {
                mode: ExtractMode::Thorough,
                read_cover_art: true,
            },
        )
        .unwrap();

        assert_eq!(track.duration.as_secs(), 5);
        assert_eq!(track.bitrate, 1411);
        assert!(!track.estimated);
        assert!(track.cover_art.is_none());
        if !track.tagged {
            assert_eq!(track.title, "Field Recording");
            assert_eq!(track.artist, UNKNOWN_ARTIST);
            assert_eq!(track.album, UNKNOWN_ALBUM);
            assert_eq!(track.genre, UNKNOWN_GENRE);
        }
    }

    #[test]
    fn fast_mode_estimates_flac() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.flac");
        std::fs::write(&path, b"not really flac").unwrap();
        let track = extract_track(
            &path,
            AudioFormat::Flac,
            250_000,
            ExtractOptions {
                mode: ExtractMode::Fast,
                read_cover_art: false,
            },
        )
        .unwrap();
        assert!(track.estimated);
        assert_eq!(track.bitrate, properties::FLAC_FLAT_KBPS);
        assert_eq!(track.duration.as_secs(), 2);
        assert!(!track.tagged);
        assert_eq!(track.title, "x");
    }

    #[test]
    fn oversized_or_empty_covers_are_dropped() {
        let at_limit = CoverArt::new(vec![0xFF; MAX_COVER_ART_BYTES]);
        assert!(cover_within_limit(&at_limit));
        let oversized = CoverArt::new(vec![0xFF; MAX_COVER_ART_BYTES + 1]);
        assert!(!cover_within_limit(&oversized));
        assert!(!cover_within_limit(&CoverArt::new(Vec::new())));
    }
}
