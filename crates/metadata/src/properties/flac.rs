use std::io::{Read, Seek};

use super::{bitrate_from_duration, read_at, AudioProperties};

const MAGIC: &[u8; 4] = b"fLaC";
const STREAMINFO: u8 = 0;
const STREAMINFO_LEN: usize = 34;
const MAX_BLOCKS: usize = 128;

/// Reads STREAMINFO for the sample rate and total sample count.
pub(super) fn probe<R: Read + Seek>(reader: &mut R, file_size: u64) -> Option<AudioProperties> {
    let mut magic = [0u8; 4];
    if read_at(reader, 0, &mut magic).ok()? < 4 || &magic != MAGIC {
        return None;
    }

    let mut offset = 4u64;
    for _ in 0..MAX_BLOCKS {
        let mut header = [0u8; 4];
        if read_at(reader, offset, &mut header).ok()? < 4 {
            return None;
        }
        let last = header[0] & 0x80 != 0;
        let block_type = header[0] & 0x7F;
        let len = u64::from(header[1]) << 16 | u64::from(header[2]) << 8 | u64::from(header[3]);
        offset += 4;

        if block_type == STREAMINFO {
            let mut info = [0u8; STREAMINFO_LEN];
            if len < STREAMINFO_LEN as u64
                || read_at(reader, offset, &mut info).ok()? < STREAMINFO_LEN
            {
                return None;
            }
            return from_streaminfo(&info, file_size);
        }
        if last {
            break;
        }
        offset += len;
    }
    None
}

fn from_streaminfo(info: &[u8; STREAMINFO_LEN], file_size: u64) -> Option<AudioProperties> {
    let sample_rate =
        u32::from(info[10]) << 12 | u32::from(info[11]) << 4 | u32::from(info[12]) >> 4;
    let total_samples = u64::from(info[13] & 0x0F) << 32
        | u64::from(info[14]) << 24
        | u64::from(info[15]) << 16
        | u64::from(info[16]) << 8
        | u64::from(info[17]);
    if sample_rate == 0 || total_samples == 0 {
        return None;
    }
    let secs = total_samples as f64 / f64::from(sample_rate);
    Some(AudioProperties::measured(
        secs,
        bitrate_from_duration(file_size, secs),
    ))
}
