//! # teleop-core
//!
//! Shared library for the teleop client containing the outbound telegram
//! encoders and the inbound response parser.
//!
//! This crate is used by both the channel-manager library (`teleop-link`)
//! and the control-loop application (`teleop-client`). It has zero
//! dependencies on sockets, timers, or OS APIs, so everything here is
//! testable with plain byte slices.
//!
//! The wire protocol is short ASCII command telegrams over TCP:
//!
//! - **rover** — two signed 3-digit zero-padded motor speeds separated by a
//!   NUL byte and terminated by a newline, e.g. `+050\0-100\n`.
//! - **neck** — a single direction character (`a` left, `d` right) or a
//!   decimal position string; responses embed the servo position as
//!   `pos: <digits>\n` inside free-form text.

pub mod position;
pub mod telegram;

pub use position::{find_subslice, scan_position, DecodeError, PositionMatch};
pub use telegram::{DriveTelegram, NeckTelegram, TelegramError, MAX_TELEGRAM_BYTES};
