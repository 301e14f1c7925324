use std::io::{Read, Seek};

use super::{read_at, AudioProperties};

/// Frames averaged by the thorough probe.
const MAX_SAMPLED_FRAMES: u32 = 100;
/// Bytes inspected by the fast probe.
const FAST_PROBE_BYTES: usize = 512;
const WINDOW_BYTES: usize = 64 * 1024;
/// Stop hunting for sync after this many bytes past the audio start.
const MAX_SYNC_SCAN_BYTES: u64 = 8 * 1024 * 1024;

// Layer III tables, indices 1..=14. Index 0 (free format) and 15 are invalid.
const V1_L3_KBPS: [u32; 16] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0,
];
const V2_L3_KBPS: [u32; 16] = [
    0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0,
];

const VERSION_1: u8 = 3;
const VERSION_2: u8 = 2;
const VERSION_2_5: u8 = 0;

/// Bitrate in kbps for a Layer III header, 0 when the index is invalid.
/// `version` is the raw 2-bit field: 3 = MPEG-1, 2 = MPEG-2, 0 = MPEG-2.5.
pub fn bitrate_kbps(version: u8, index: u8) -> u32 {
    if index >= 15 {
        return 0;
    }
    if version == VERSION_1 {
        V1_L3_KBPS[index as usize]
    } else {
        V2_L3_KBPS[index as usize]
    }
}

/// Sample rate in Hz, 0 for the reserved version or index.
pub fn sample_rate(version: u8, index: u8) -> u32 {
    let rates: [u32; 3] = match version {
        VERSION_1 => [44100, 48000, 32000],
        VERSION_2 => [22050, 24000, 16000],
        VERSION_2_5 => [11025, 12000, 8000],
        _ => return 0,
    };
    rates.get(index as usize).copied().unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameHeader {
    bitrate: u32,
    sample_rate: u32,
    padding: u32,
}

impl FrameHeader {
    fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] & 0xE0 != 0xE0 {
            return None;
        }
        let version = (bytes[1] >> 3) & 0x03;
        let bitrate = bitrate_kbps(version, (bytes[2] >> 4) & 0x0F);
        if bitrate == 0 {
            return None;
        }
        let sample_rate = sample_rate(version, (bytes[2] >> 2) & 0x03);
        if sample_rate == 0 {
            return None;
        }
        let padding = u32::from((bytes[2] >> 1) & 0x01);
        Some(Self {
            bitrate,
            sample_rate,
            padding,
        })
    }

    fn frame_len(&self) -> u64 {
        u64::from(144 * self.bitrate * 1000 / self.sample_rate + self.padding)
    }
}

/// Averages the bitrate over up to [`MAX_SAMPLED_FRAMES`] frames.
pub(super) fn probe<R: Read + Seek>(reader: &mut R, file_size: u64) -> Option<AudioProperties> {
    let start = id3v2_len(reader).unwrap_or(0);
    let limit = start.saturating_add(MAX_SYNC_SCAN_BYTES);
    let mut buf = vec![0u8; WINDOW_BYTES];
    let mut offset = start;
    let mut frames = 0u32;
    let mut total_kbps = 0u64;

    'windows: while offset < limit {
        let n = read_at(reader, offset, &mut buf).ok()?;
        if n < 4 {
            break;
        }
        let mut i = 0usize;
        while i + 4 <= n {
            match FrameHeader::parse(&buf[i..i + 4]) {
                Some(header) => {
                    frames += 1;
                    total_kbps += u64::from(header.bitrate);
                    if frames >= MAX_SAMPLED_FRAMES {
                        break 'windows;
                    }
                    i += header.frame_len().max(4) as usize;
                }
                None => i += 1,
            }
        }
        if n < buf.len() && i + 4 > n {
            break;
        }
        offset += i as u64;
    }

    if frames == 0 {
        return None;
    }
    let avg = (total_kbps / u64::from(frames)) as u32;
    if avg == 0 {
        return None;
    }
    let secs = (file_size as f64 * 8.0) / (f64::from(avg) * 1000.0);
    Some(AudioProperties::measured(secs, avg))
}

/// Uses the first frame found in the opening bytes of the audio stream.
pub(super) fn probe_first_frame<R: Read + Seek>(
    reader: &mut R,
    file_size: u64,
) -> Option<AudioProperties> {
    let start = id3v2_len(reader).unwrap_or(0);
    let mut buf = [0u8; FAST_PROBE_BYTES];
    let n = read_at(reader, start, &mut buf).ok()?;
    let header = buf[..n]
        .windows(4)
        .find_map(FrameHeader::parse)?;
    let secs = (file_size as f64 * 8.0) / (f64::from(header.bitrate) * 1000.0);
    Some(AudioProperties::measured(secs, header.bitrate))
}

/// Length of a leading ID3v2 tag including its header, if one is present.
fn id3v2_len<R: Read + Seek>(reader: &mut R) -> Option<u64> {
    let mut header = [0u8; 10];
    let n = read_at(reader, 0, &mut header).ok()?;
    if n < 10 || &header[..3] != b"ID3" {
        return None;
    }
    let size = header[6..10]
        .iter()
        .fold(0u64, |acc, b| (acc << 7) | u64::from(b & 0x7F));
    let footer = if header[5] & 0x10 != 0 { 10 } else { 0 };
    Some(10 + size + footer)
}
