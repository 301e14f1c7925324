use std::io::{Read, Seek};

use super::{read_at, AudioProperties};

/// Canonical RIFF/WAVE header size subtracted from the file size.
const CANONICAL_HEADER_LEN: u64 = 44;
const MAX_CHUNKS: usize = 64;
/// 32-bit float, 8 channels at 384 kHz is just under this.
const MAX_PLAUSIBLE_KBPS: u64 = 100_000;

pub(super) fn probe<R: Read + Seek>(reader: &mut R, file_size: u64) -> Option<AudioProperties> {
    let mut riff = [0u8; 12];
    if read_at(reader, 0, &mut riff).ok()? < 12 || &riff[..4] != b"RIFF" || &riff[8..] != b"WAVE"
    {
        return None;
    }

    let mut offset = 12u64;
    for _ in 0..MAX_CHUNKS {
        let mut header = [0u8; 8];
        if read_at(reader, offset, &mut header).ok()? < 8 {
            return None;
        }
        let size = u64::from(u32::from_le_bytes([header[4], header[5], header[6], header[7]]));
        offset += 8;

        if &header[..4] == b"fmt " {
            let mut fmt = [0u8; 12];
            if size < 12 || read_at(reader, offset, &mut fmt).ok()? < 12 {
                return None;
            }
            let sample_rate = u32::from_le_bytes([fmt[4], fmt[5], fmt[6], fmt[7]]);
            let byte_rate = u32::from_le_bytes([fmt[8], fmt[9], fmt[10], fmt[11]]);
            return from_rates(sample_rate, byte_rate, file_size);
        }
        // Chunks are word aligned.
        offset += size + (size & 1);
    }
    None
}

fn from_rates(sample_rate: u32, byte_rate: u32, file_size: u64) -> Option<AudioProperties> {
    let data_len = file_size.saturating_sub(CANONICAL_HEADER_LEN) as f64;
    if byte_rate > 0 {
        let bitrate = plausible_kbps(u64::from(byte_rate) * 8 / 1000)?;
        let secs = data_len / f64::from(byte_rate);
        return Some(AudioProperties::measured(secs, bitrate));
    }
    // No byte rate: assume 16-bit stereo.
    let bitrate = plausible_kbps(u64::from(sample_rate) * 16 * 2 / 1000)?;
    let secs = data_len * 8.0 / (f64::from(bitrate) * 1000.0);
    Some(AudioProperties::measured(secs, bitrate))
}

fn plausible_kbps(kbps: u64) -> Option<u32> {
    if kbps == 0 || kbps > MAX_PLAUSIBLE_KBPS {
        return None;
    }
    u32::try_from(kbps).ok()
}
