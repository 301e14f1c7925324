use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use common::path_to_slash_string;
use metadata::CoverArt;
use tracing::debug;

use crate::normalize;

/// Leaves room for `_`, a 64-char artist id and the extension under the
/// usual 255-byte file name limit.
const MAX_ALBUM_STEM_BYTES: usize = 180;

/// Directory that receives album artwork pulled out of audio tags.
#[derive(Clone, Debug)]
pub struct CoverStore {
    dir: PathBuf,
}

impl CoverStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the artwork and returns its path with `/` separators.
    pub fn save(&self, album_name: &str, artist_id: &str, cover: &CoverArt) -> io::Result<String> {
        fs::create_dir_all(&self.dir)?;
        let file_name = format!(
            "{}_{}.{}",
            safe_file_name(album_name),
            artist_id,
            cover.extension()
        );
        let path = self.dir.join(file_name);
        fs::write(&path, &cover.data)?;
        debug!("Saved cover art for {:?} to {:?}", album_name, path);
        Ok(path_to_slash_string(&path))
    }
}

fn safe_file_name(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect();
    normalize::clean_string(&safe, MAX_ALBUM_STEM_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_reserved_characters() {
        assert_eq!(safe_file_name("AC/DC: Live?"), "AC_DC_ Live_");
        assert_eq!(safe_file_name(r#"a\b*c"d<e>f|g"#), "a_b_c_d_e_f_g");
        assert_eq!(safe_file_name("Plain Name"), "Plain Name");
    }

    #[test]
    fn long_album_names_fit_a_file_name() {
        let album = "é".repeat(255);
        let stem = safe_file_name(&album);
        assert!(stem.len() <= MAX_ALBUM_STEM_BYTES);
        assert!(stem.chars().all(|ch| ch == 'é'));

        let dir = tempfile::tempdir().unwrap();
        let store = CoverStore::new(dir.path().join("covers"));
        let artist_id = "a".repeat(64);
        let jpeg = CoverArt::new(vec![0xFF, 0xD8, 0xFF, 0xE0]);
        let saved = store.save(&album, &artist_id, &jpeg).unwrap();
        let file_name = saved.rsplit('/').next().unwrap();
        assert!(file_name.len() <= 255);
        assert!(file_name.ends_with(&format!("_{}.jpg", artist_id)));
    }

    #[test]
    fn saves_under_safe_name_with_magic_extension() {
        let dir = tempfile::tempdir().unwrap();
        let store = CoverStore::new(dir.path().join("covers"));
        let png = CoverArt::new(vec![0x89, 0x50, 0x4E, 0x47, 1, 2, 3]);
        let saved = store.save("Who/What", "abc123", &png).unwrap();
        assert!(saved.ends_with("covers/Who_What_abc123.png"));
        assert!(!saved.contains('\\'));
        let written = std::fs::read(dir.path().join("covers/Who_What_abc123.png")).unwrap();
        assert_eq!(written, png.data);
    }
}
