//! Inbound response parsing for the neck channel.
//!
//! The neck firmware reports its servo position inside free-form text:
//! an arbitrary prefix, the literal `pos: `, a run of decimal digits, a
//! newline, then arbitrary trailing bytes. The scan below is an explicit
//! substring search, not a regular expression: first match wins, and a
//! marker with a malformed digit run is a distinct decode failure rather
//! than "no match".

use thiserror::Error;

/// The literal marker preceding the position digits.
const POSITION_MARKER: &[u8] = b"pos: ";

/// The servo never reports more digits than this; a longer run means the
/// stream is desynchronised.
const MAX_POSITION_DIGITS: usize = 3;

/// Errors produced while decoding a position report.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The marker was present but not followed by any digits.
    #[error("position marker found but no digits follow")]
    MissingDigits,

    /// The digit run was longer than a servo position can be.
    #[error("position digit run exceeds {MAX_POSITION_DIGITS} digits")]
    TooManyDigits,

    /// The digit run was not terminated by a newline.
    #[error("position digits not terminated by newline (got byte 0x{0:02X})")]
    BadTerminator(u8),
}

/// A successfully decoded position report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionMatch {
    /// The reported servo position in degrees.
    pub degrees: u16,
    /// Buffer offset one past the terminating newline. The caller trims
    /// the buffer to this offset so memory stays bounded between matches.
    pub consumed: usize,
}

/// Scans `buf` for the first complete `pos: <digits>\n` report.
///
/// Returns `Ok(None)` when no marker (or no complete report) is present
/// yet — the caller keeps accumulating bytes. A marker followed by a
/// malformed digit run is an error, not a miss.
///
/// # Errors
///
/// Returns [`DecodeError`] when the marker is present but the digit run is
/// empty, too long, or not newline-terminated.
pub fn scan_position(buf: &[u8]) -> Result<Option<PositionMatch>, DecodeError> {
    let Some(marker_at) = find_subslice(buf, POSITION_MARKER) else {
        return Ok(None);
    };

    let digits_start = marker_at + POSITION_MARKER.len();
    let mut cursor = digits_start;
    while cursor < buf.len() && buf[cursor].is_ascii_digit() {
        cursor += 1;
    }
    let digit_count = cursor - digits_start;

    if cursor == buf.len() {
        // Report still arriving: we cannot yet tell digits from terminator,
        // unless the run is already over-long.
        if digit_count > MAX_POSITION_DIGITS {
            return Err(DecodeError::TooManyDigits);
        }
        return Ok(None);
    }

    if digit_count == 0 {
        return Err(DecodeError::MissingDigits);
    }
    if digit_count > MAX_POSITION_DIGITS {
        return Err(DecodeError::TooManyDigits);
    }
    if buf[cursor] != b'\n' {
        return Err(DecodeError::BadTerminator(buf[cursor]));
    }

    // At most 3 ASCII digits: always parses and fits in u16.
    let text = std::str::from_utf8(&buf[digits_start..cursor]).unwrap_or("0");
    let degrees: u16 = text.parse().unwrap_or(0);

    Ok(Some(PositionMatch {
        degrees,
        consumed: cursor + 1,
    }))
}

/// Returns the offset of the first occurrence of `needle` in `haystack`.
///
/// Shared with the channel layer, which uses it to spot handshake and
/// acknowledgment markers in a connection's read buffer.
pub fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
