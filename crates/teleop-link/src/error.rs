//! Error taxonomy for the channel layer.
//!
//! Transient conditions (receive-would-block, marker-not-yet-seen) never
//! surface here — they are absorbed inside the bounded-wait loops. Every
//! variant below is a real, caller-visible failure.

use std::net::SocketAddr;

use teleop_core::position::DecodeError;
use teleop_core::MAX_TELEGRAM_BYTES;
use thiserror::Error;

/// Errors surfaced by the channel manager and its connections.
#[derive(Debug, Error)]
pub enum LinkError {
    /// An ack marker was configured without an initial command. Detected at
    /// load time, before any connection attempt.
    #[error("channel {channel}: command_ack configured without initial_command")]
    ConfigInvalid { channel: String },

    /// The caller named a channel that was never configured.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// TCP connect refused/unreachable after the bounded attempt budget.
    #[error("channel {channel}: connect to {address} failed after {attempts} attempt(s): {source}")]
    ConnectFailure {
        channel: String,
        address: SocketAddr,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// A pre- or post-greeting marker was not observed within the bail
    /// timeout.
    #[error("channel {channel}: handshake marker {marker:?} not observed within {waited_ms}ms")]
    HandshakeTimeout {
        channel: String,
        marker: String,
        waited_ms: u64,
    },

    /// The previous command's ack marker was not observed before the next
    /// send was due.
    #[error("channel {channel}: command ack not observed within {waited_ms}ms")]
    AckTimeout { channel: String, waited_ms: u64 },

    /// An expected response (e.g. a neck position report) did not arrive
    /// within the bail timeout.
    #[error("channel {channel}: response not observed within {waited_ms}ms")]
    ResponseTimeout { channel: String, waited_ms: u64 },

    /// Transmit error (broken pipe, reset, write timeout).
    #[error("channel {channel}: send failed: {source}")]
    SendFailure {
        channel: String,
        #[source]
        source: std::io::Error,
    },

    /// The caller supplied a telegram over the size limit. Rejected before
    /// any socket is touched; never retried.
    #[error("telegram of {size} bytes exceeds the {MAX_TELEGRAM_BYTES}-byte limit")]
    OversizedTelegram { size: usize },

    /// A response marker was found but its embedded payload failed to
    /// parse. Connection state is unaffected.
    #[error("channel {channel}: response decode failed: {source}")]
    DecodeFailure {
        channel: String,
        #[source]
        source: DecodeError,
    },
}

impl LinkError {
    /// Maps fatal failure categories to distinct process exit statuses so
    /// operators can tell bad config from unreachable network from protocol
    /// desync.
    pub fn exit_code(&self) -> i32 {
        match self {
            LinkError::ConfigInvalid { .. } => 2,
            LinkError::ConnectFailure { .. } => 3,
            LinkError::HandshakeTimeout { .. } => 4,
            LinkError::AckTimeout { .. } | LinkError::ResponseTimeout { .. } => 5,
            LinkError::SendFailure { .. } => 6,
            LinkError::UnknownChannel(_)
            | LinkError::OversizedTelegram { .. }
            | LinkError::DecodeFailure { .. } => 1,
        }
    }

    /// Whether the failure is worth exactly one reconnect-and-retry inside
    /// `send`. A second occurrence is surfaced as fatal.
    pub(crate) fn retryable_once(&self) -> bool {
        matches!(
            self,
            LinkError::AckTimeout { .. } | LinkError::SendFailure { .. }
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
