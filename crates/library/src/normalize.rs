//! Cleanup and clamping applied to extracted fields before they reach the
//! catalog.

use std::time::Duration;

pub const MAX_NAME_BYTES: usize = 255;
pub const MAX_GENRE_BYTES: usize = 100;
pub const MAX_TRACK_NUMBER: u32 = 999;
pub const MAX_DURATION_SECS: u64 = 86_400;
pub const MAX_BITRATE_KBPS: u32 = 10_000;

/// Trims, drops NUL and U+FFFD, and caps at `max_bytes` on a char boundary.
pub fn clean_string(input: &str, max_bytes: usize) -> String {
    let mut out: String = input
        .trim()
        .chars()
        .filter(|ch| *ch != '\0' && *ch != char::REPLACEMENT_CHARACTER)
        .collect();
    if out.len() > max_bytes {
        let mut end = max_bytes;
        while !out.is_char_boundary(end) {
            end -= 1;
        }
        out.truncate(end);
    }
    out.trim().to_string()
}

/// Cleaned name, or `default` when nothing is left.
pub fn name_or(input: &str, default: &str) -> String {
    let cleaned = clean_string(input, MAX_NAME_BYTES);
    if cleaned.is_empty() {
        default.to_string()
    } else {
        cleaned
    }
}

pub fn genre_or(input: &str, default: &str) -> String {
    let cleaned = clean_string(input, MAX_GENRE_BYTES);
    if cleaned.is_empty() {
        default.to_string()
    } else {
        cleaned
    }
}

pub fn track_number(value: u32) -> u16 {
    value.min(MAX_TRACK_NUMBER) as u16
}

pub fn duration_secs(value: Duration) -> u32 {
    value.as_secs().min(MAX_DURATION_SECS) as u32
}

pub fn bitrate(value: u32) -> u32 {
    value.min(MAX_BITRATE_KBPS)
}
