use std::io::{Read, Seek, SeekFrom};

use super::{bitrate_from_duration, read_at, AudioProperties};

const CAPTURE: &[u8; 4] = b"OggS";
const PAGE_HEADER_LEN: usize = 27;
const TAIL_BYTES: u64 = 64 * 1024;
/// Vorbis streams are assumed to run at 48 kHz regardless of the header.
const ASSUMED_SAMPLE_RATE: f64 = 48_000.0;

/// Duration from the granule position of the last page in the file tail.
pub(super) fn probe<R: Read + Seek>(reader: &mut R, file_size: u64) -> Option<AudioProperties> {
    let mut header = [0u8; PAGE_HEADER_LEN];
    if read_at(reader, 0, &mut header).ok()? < PAGE_HEADER_LEN || &header[..4] != CAPTURE {
        return None;
    }

    let len = reader.seek(SeekFrom::End(0)).ok()?;
    let start = len.saturating_sub(TAIL_BYTES);
    let mut tail = vec![0u8; (len - start) as usize];
    let n = read_at(reader, start, &mut tail).ok()?;
    let granule = last_granule(&tail[..n])?;
    if granule <= 0 {
        return None;
    }

    let secs = granule as f64 / ASSUMED_SAMPLE_RATE;
    Some(AudioProperties::measured(
        secs,
        bitrate_from_duration(file_size, secs),
    ))
}

fn last_granule(tail: &[u8]) -> Option<i64> {
    if tail.len() < PAGE_HEADER_LEN {
        return None;
    }
    let page = (0..=tail.len() - PAGE_HEADER_LEN)
        .rev()
        .find(|&i| &tail[i..i + 4] == CAPTURE)?;
    let mut granule = [0u8; 8];
    granule.copy_from_slice(&tail[page + 6..page + 14]);
    Some(i64::from_le_bytes(granule))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn page(granule: i64, body_len: usize) -> Vec<u8> {
        let mut out = CAPTURE.to_vec();
        out.push(0); // version
        out.push(0); // header type
        out.extend_from_slice(&granule.to_le_bytes());
        out.resize(PAGE_HEADER_LEN, 0);
        out.resize(PAGE_HEADER_LEN + body_len, 0x55);
        out
    }

    #[test]
    fn uses_last_page_granule() {
        let mut data = page(0, 100);
        data.extend(page(48_000 * 30, 4000));
        data.extend(page(48_000 * 120, 4000));
        let props = probe(&mut Cursor::new(data), 2_880_000).unwrap();
        assert_eq!(props.duration_secs(), 120);
        assert_eq!(props.bitrate, 192);
        assert!(!props.estimated);
    }

    #[test]
    fn only_reads_the_tail() {
        let mut data = page(48_000 * 10, 100);
        data.resize(200_000, 0);
        // No page inside the final 64 KiB.
        assert!(probe(&mut Cursor::new(data.clone()), 200_000).is_none());
        data.extend(page(48_000 * 20, 10));
        let size = data.len() as u64;
        let props = probe(&mut Cursor::new(data), size).unwrap();
        assert_eq!(props.duration_secs(), 20);
    }

    #[test]
    fn negative_granule_is_rejected() {
        let mut data = page(0, 10);
        data.extend(page(-1, 10));
        assert!(probe(&mut Cursor::new(data), 1_000).is_none());
    }

    #[test]
    fn short_stream_is_rejected() {
        assert!(probe(&mut Cursor::new(b"OggS".to_vec()), 4).is_none());
    }
}
