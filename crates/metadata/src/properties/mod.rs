//! Duration and bitrate extraction straight from container bytes.
//!
//! Every parser reads a bounded amount of data and degrades to a flat,
//! size-based estimate instead of failing.

mod flac;
mod mp3;
mod ogg;
mod wav;

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

use common::AudioFormat;

pub use mp3::{bitrate_kbps as mp3_bitrate_kbps, sample_rate as mp3_sample_rate};

pub const DEFAULT_FLAT_KBPS: u32 = 192;
pub const MP3_FALLBACK_KBPS: u32 = 128;
pub const MP3_FAST_FALLBACK_KBPS: u32 = 192;
pub const FLAC_FLAT_KBPS: u32 = 1000;
pub const OGG_FLAT_KBPS: u32 = 192;
pub const WAV_FLAT_KBPS: u32 = 1411;
pub const M4A_FLAT_KBPS: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractMode {
    /// Walks frames and headers for a measured value.
    #[default]
    Thorough,
    /// Single-frame peek for MP3, flat estimates for everything else.
    Fast,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioProperties {
    pub duration: Duration,
    /// Kilobits per second.
    pub bitrate: u32,
    /// True when the value came from a flat estimate rather than the stream.
    pub estimated: bool,
}

impl AudioProperties {
    fn measured(duration_secs: f64, bitrate: u32) -> Self {
        Self {
            duration: secs_to_duration(duration_secs),
            bitrate,
            estimated: false,
        }
    }

    /// `duration = file_size * 8 / (bitrate * 1000)`.
    pub fn flat(file_size: u64, bitrate: u32) -> Self {
        let secs = if bitrate == 0 {
            0.0
        } else {
            (file_size as f64 * 8.0) / (f64::from(bitrate) * 1000.0)
        };
        Self {
            duration: secs_to_duration(secs),
            bitrate,
            estimated: true,
        }
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration.as_secs()
    }
}

/// Flat bitrate assumed for a format when nothing is parsed.
pub fn flat_bitrate(format: AudioFormat) -> u32 {
    match format {
        AudioFormat::M4a => M4A_FLAT_KBPS,
        AudioFormat::Ogg => OGG_FLAT_KBPS,
        AudioFormat::Wav => WAV_FLAT_KBPS,
        AudioFormat::Flac => FLAC_FLAT_KBPS,
        AudioFormat::Mp3 => DEFAULT_FLAT_KBPS,
    }
}

pub fn estimate_by_size(format: AudioFormat, file_size: u64) -> AudioProperties {
    AudioProperties::flat(file_size, flat_bitrate(format))
}

/// Opens `path` and measures it. An unopenable file yields the format's
/// fallback estimate.
pub fn extract_properties(
    path: &Path,
    format: AudioFormat,
    file_size: u64,
    mode: ExtractMode,
) -> AudioProperties {
    if mode == ExtractMode::Fast && format != AudioFormat::Mp3 {
        return estimate_by_size(format, file_size);
    }
    match File::open(path) {
        Ok(mut file) => read_properties(&mut file, format, file_size, mode),
        Err(err) => {
            tracing::debug!("Could not open {:?} for probing: {}", path, err);
            fallback(format, file_size, mode)
        }
    }
}

/// Same as [`extract_properties`] over any seekable reader.
pub fn read_properties<R: Read + Seek>(
    reader: &mut R,
    format: AudioFormat,
    file_size: u64,
    mode: ExtractMode,
) -> AudioProperties {
    let parsed = match (format, mode) {
        (AudioFormat::Mp3, ExtractMode::Thorough) => mp3::probe(reader, file_size),
        (AudioFormat::Mp3, ExtractMode::Fast) => mp3::probe_first_frame(reader, file_size),
        (AudioFormat::Flac, ExtractMode::Thorough) => flac::probe(reader, file_size),
        (AudioFormat::Ogg, ExtractMode::Thorough) => ogg::probe(reader, file_size),
        (AudioFormat::Wav, ExtractMode::Thorough) => wav::probe(reader, file_size),
        _ => None,
    };
    parsed.unwrap_or_else(|| fallback(format, file_size, mode))
}

fn fallback(format: AudioFormat, file_size: u64, mode: ExtractMode) -> AudioProperties {
    match (format, mode) {
        (AudioFormat::Mp3, ExtractMode::Thorough) => {
            AudioProperties::flat(file_size, MP3_FALLBACK_KBPS)
        }
        (AudioFormat::Mp3, ExtractMode::Fast) => {
            AudioProperties::flat(file_size, MP3_FAST_FALLBACK_KBPS)
        }
        _ => estimate_by_size(format, file_size),
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

/// Reads until `buf` is full or the stream ends; returns the byte count.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

fn read_at<R: Read + Seek>(reader: &mut R, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    reader.seek(SeekFrom::Start(offset))?;
    read_up_to(reader, buf)
}

fn bitrate_from_duration(file_size: u64, duration_secs: f64) -> u32 {
    if duration_secs <= 0.0 {
        return 0;
    }
    let kbps = (file_size as f64 * 8.0) / duration_secs / 1000.0;
    if kbps >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        kbps as u32
    }
}
