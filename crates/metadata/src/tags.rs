use std::path::Path;

use common::{UNKNOWN_ALBUM, UNKNOWN_ARTIST, UNKNOWN_GENRE};
use lofty::picture::{Picture, PictureType};
use lofty::prelude::{ItemKey, TaggedFileExt};

use crate::MetadataError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverArt {
    pub data: Vec<u8>,
    pub mime: Option<String>,
}

impl CoverArt {
    pub fn new(data: Vec<u8>) -> Self {
        let mime = guess_mime(&data);
        Self { data, mime }
    }

    /// File extension for the stored image; JPEG unless the bytes say PNG.
    pub fn extension(&self) -> &'static str {
        match self.mime.as_deref() {
            Some("image/png") => "png",
            _ => "jpg",
        }
    }
}

/// Fields read from an embedded tag by the tag reader.
#[derive(Debug, Default, Clone)]
pub struct TagMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub track_no: Option<u32>,
    pub cover: Option<CoverArt>,
}

/// Stand-in used when a file carries no readable tag.
#[derive(Debug, Clone)]
pub struct BasicMetadata {
    pub title: String,
}

impl BasicMetadata {
    pub fn from_path(path: &Path) -> Self {
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Self { title }
    }
}

#[derive(Debug, Clone)]
pub enum TrackTags {
    Tagged(TagMetadata),
    Basic(BasicMetadata),
}

impl TrackTags {
    /// Reads the primary tag, falling back to [`BasicMetadata`] when the
    /// reader rejects the file.
    pub fn read(path: &Path, with_cover: bool) -> Self {
        match read_tags(path, with_cover) {
            Ok(tags) => TrackTags::Tagged(tags),
            Err(err) => {
                tracing::warn!("Could not read tags from {:?}: {}", path, err);
                TrackTags::Basic(BasicMetadata::from_path(path))
            }
        }
    }

    pub fn is_tagged(&self) -> bool {
        matches!(self, TrackTags::Tagged(_))
    }

    pub fn title(&self) -> &str {
        match self {
            TrackTags::Tagged(tags) => tags.title.as_deref().unwrap_or(""),
            TrackTags::Basic(basic) => &basic.title,
        }
    }

    pub fn artist(&self) -> &str {
        match self {
            TrackTags::Tagged(tags) => tags.artist.as_deref().unwrap_or(""),
            TrackTags::Basic(_) => UNKNOWN_ARTIST,
        }
    }

    pub fn album(&self) -> &str {
        match self {
            TrackTags::Tagged(tags) => tags.album.as_deref().unwrap_or(""),
            TrackTags::Basic(_) => UNKNOWN_ALBUM,
        }
    }

    pub fn genre(&self) -> &str {
        match self {
            TrackTags::Tagged(tags) => tags.genre.as_deref().unwrap_or(""),
            TrackTags::Basic(_) => UNKNOWN_GENRE,
        }
    }

    pub fn year(&self) -> i32 {
        match self {
            TrackTags::Tagged(tags) => tags.year.unwrap_or(0),
            TrackTags::Basic(_) => 0,
        }
    }

    pub fn track_no(&self) -> u32 {
        match self {
            TrackTags::Tagged(tags) => tags.track_no.unwrap_or(0),
            TrackTags::Basic(_) => 0,
        }
    }

    pub fn into_cover(self) -> Option<CoverArt> {
        match self {
            TrackTags::Tagged(tags) => tags.cover,
            TrackTags::Basic(_) => None,
        }
    }
}

pub fn read_tags(path: &Path, with_cover: bool) -> Result<TagMetadata, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let mut info = TagMetadata::default();

    let tag = match tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        Some(tag) => tag,
        None => return Ok(info),
    };

    info.title = tag.get_string(&ItemKey::TrackTitle).map(|v| v.to_string());
    info.album = tag.get_string(&ItemKey::AlbumTitle).map(|v| v.to_string());
    info.artist = tag
        .get_string(&ItemKey::TrackArtist)
        .or_else(|| tag.get_string(&ItemKey::AlbumArtist))
        .map(|v| v.to_string());
    info.genre = tag.get_string(&ItemKey::Genre).map(|v| v.to_string());
    info.track_no = tag.get_string(&ItemKey::TrackNumber).and_then(parse_number);
    info.year = tag
        .get_string(&ItemKey::Year)
        .or_else(|| tag.get_string(&ItemKey::RecordingDate))
        .and_then(parse_year);

    if with_cover {
        if let Some(picture) = pick_picture(tag.pictures()) {
            info.cover = Some(CoverArt::new(picture.data().to_vec()));
        }
    }

    Ok(info)
}

fn parse_number(text: &str) -> Option<u32> {
    let head = text.split('/').next().unwrap_or(text).trim();
    head.parse().ok()
}

fn parse_year(text: &str) -> Option<i32> {
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

/// Front cover when tagged as such, else the first picture.
fn pick_picture(pictures: &[Picture]) -> Option<&Picture> {
    pictures
        .iter()
        .find(|picture| picture.pic_type() == PictureType::CoverFront)
        .or_else(|| pictures.first())
}

fn guess_mime(bytes: &[u8]) -> Option<String> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg".to_string())
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some("image/png".to_string())
    } else {
        None
    }
}
