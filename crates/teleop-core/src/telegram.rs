//! Outbound command telegram encoding.
//!
//! Telegrams are bounded-length ASCII byte sequences. The rover expects two
//! motor-speed fields (`<sign><3-digit zero-padded speed>`) separated by a
//! NUL byte and terminated by a newline; the neck accepts single direction
//! characters or a decimal position.

use thiserror::Error;

/// Maximum size of any outbound telegram in bytes. Larger telegrams are a
/// caller bug and are rejected before touching the socket.
pub const MAX_TELEGRAM_BYTES: usize = 1024;

/// Width of a zero-padded motor-speed field.
const SPEED_FIELD_WIDTH: usize = 3;

/// Largest motor speed representable in a 3-digit field.
pub const MAX_SPEED: i16 = 999;

/// Errors produced while encoding or decoding telegram fields.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TelegramError {
    /// A motor speed magnitude does not fit in a 3-digit field.
    #[error("motor speed {0} out of range (magnitude must be <= {MAX_SPEED})")]
    SpeedOutOfRange(i16),

    /// A speed field contained something other than exactly three ASCII digits.
    #[error("malformed speed field: {0:?}")]
    MalformedSpeedField(String),
}

/// Zero-pads a non-negative value into a 3-digit ASCII field.
///
/// # Examples
///
/// ```
/// assert_eq!(teleop_core::telegram::zero_pad3(50), "050");
/// assert_eq!(teleop_core::telegram::zero_pad3(0), "000");
/// ```
pub fn zero_pad3(value: u16) -> String {
    format!("{value:0width$}", width = SPEED_FIELD_WIDTH)
}

/// Parses a 3-digit zero-padded speed field back into its value.
///
/// # Errors
///
/// Returns [`TelegramError::MalformedSpeedField`] unless the field is exactly
/// three ASCII digits.
pub fn parse_speed_field(field: &str) -> Result<u16, TelegramError> {
    if field.len() != SPEED_FIELD_WIDTH || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TelegramError::MalformedSpeedField(field.to_string()));
    }
    // Three ASCII digits always fit in a u16.
    Ok(field.parse().unwrap_or(0))
}

/// One differential-drive command: signed speeds for the left and right
/// motors. Positive is forward, negative is reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveTelegram {
    pub left: i16,
    pub right: i16,
}

impl DriveTelegram {
    /// The explicit all-stop command sent when the operator releases the
    /// controls.
    pub const STOP: DriveTelegram = DriveTelegram { left: 0, right: 0 };

    /// Creates a drive telegram, rejecting speeds outside the 3-digit field.
    ///
    /// # Errors
    ///
    /// Returns [`TelegramError::SpeedOutOfRange`] if either magnitude
    /// exceeds [`MAX_SPEED`].
    pub fn new(left: i16, right: i16) -> Result<Self, TelegramError> {
        for speed in [left, right] {
            if speed.unsigned_abs() > MAX_SPEED as u16 {
                return Err(TelegramError::SpeedOutOfRange(speed));
            }
        }
        Ok(Self { left, right })
    }

    /// Encodes the telegram into its wire form:
    /// `<sign><3 digits>\0<sign><3 digits>\n`.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(10);
        encode_speed(&mut buf, self.left);
        buf.push(0x00);
        encode_speed(&mut buf, self.right);
        buf.push(b'\n');
        buf
    }
}

fn encode_speed(buf: &mut Vec<u8>, speed: i16) {
    buf.push(if speed < 0 { b'-' } else { b'+' });
    buf.extend_from_slice(zero_pad3(speed.unsigned_abs()).as_bytes());
}

/// One neck (pan servo) command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeckTelegram {
    /// Step left.
    Left,
    /// Step right.
    Right,
    /// Move to an absolute position in degrees.
    Position(u16),
}

impl NeckTelegram {
    /// Encodes the telegram into its wire form: a direction character or a
    /// decimal position string.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            NeckTelegram::Left => b"a".to_vec(),
            NeckTelegram::Right => b"d".to_vec(),
            NeckTelegram::Position(deg) => deg.to_string().into_bytes(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
