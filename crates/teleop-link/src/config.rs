//! Declarative per-channel protocol descriptors and shared timing tunables.
//!
//! A [`ChannelConfig`] captures one remote endpoint's protocol quirks:
//! which bytes to greet with, which inbound markers gate the handshake,
//! what keeps the session alive, and what courtesy message precedes a
//! shutdown. Configs are created at process start and never mutated.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::LinkError;

/// Immutable descriptor of one remote endpoint and its protocol quirks.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Remote host/port of the channel.
    pub address: SocketAddr,
    /// Optional bytes sent best-effort just before closing the socket.
    pub preshutdown: Option<Vec<u8>>,
    /// Optional bytes the client sends immediately after connecting.
    pub greeting: Option<Vec<u8>>,
    /// Optional bytes sent periodically to keep the remote session alive.
    pub keepalive: Option<Vec<u8>>,
    /// Marker that must appear in the inbound stream before `greeting`
    /// may be sent.
    pub await_before_greeting: Option<Vec<u8>>,
    /// Marker that must appear after `greeting` before the channel is
    /// considered ready.
    pub await_after_greeting: Option<Vec<u8>>,
    /// Ack marker: when set, every outbound command must first observe
    /// this marker (ack of the previous command) in the inbound stream.
    pub command_ack: Option<Vec<u8>>,
    /// Command sent once upon reaching the ready state, bypassing the ack
    /// gate. Required whenever `command_ack` is set, since the gate needs
    /// a first command to produce the first ack.
    pub initial_command: Option<Vec<u8>>,
}

impl ChannelConfig {
    /// Creates a bare config: connect, no handshake, no keepalive.
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            preshutdown: None,
            greeting: None,
            keepalive: None,
            await_before_greeting: None,
            await_after_greeting: None,
            command_ack: None,
            initial_command: None,
        }
    }

    /// Stock descriptor for the pan-servo "neck" channel: a single space
    /// as both greeting and periodic keepalive, no ack discipline.
    pub fn neck(address: SocketAddr) -> Self {
        Self {
            greeting: Some(b" ".to_vec()),
            keepalive: Some(b" ".to_vec()),
            ..Self::new(address)
        }
    }

    /// Stock descriptor for the differential-drive "rover" channel: `C`
    /// greeting echoed back by the remote, `C` command acks with an
    /// all-stop initial command, all-stop keepalive, and a backslash
    /// courtesy byte before shutdown.
    pub fn rover(address: SocketAddr) -> Self {
        Self {
            preshutdown: Some(b"\\".to_vec()),
            greeting: Some(b"C".to_vec()),
            keepalive: Some(b"+000\0+000\n".to_vec()),
            await_after_greeting: Some(b"C".to_vec()),
            command_ack: Some(b"C".to_vec()),
            initial_command: Some(b"+000\0+000\n".to_vec()),
            ..Self::new(address)
        }
    }

    /// Validates the config invariant: an ack marker without an initial
    /// command would deadlock the ack gate on the very first send.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ConfigInvalid`] when `command_ack` is set and
    /// `initial_command` is not.
    pub fn validate(&self, channel: &str) -> Result<(), LinkError> {
        if self.command_ack.is_some() && self.initial_command.is_none() {
            return Err(LinkError::ConfigInvalid {
                channel: channel.to_string(),
            });
        }
        Ok(())
    }
}

/// Timing tunables shared by every bounded wait in the channel layer.
///
/// Reference deployments run the bail timeout anywhere from 500 ms to
/// 2000 ms, so it is a tunable rather than a constant. The poll sleeps
/// implement arithmetic (not exponential) backoff within a single wait,
/// capped so a late retry never sleeps past the bail deadline by much.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Maximum wall-clock duration any bounded wait may run.
    pub bail_timeout: Duration,
    /// First sleep between non-blocking poll attempts.
    pub poll_sleep_initial: Duration,
    /// Arithmetic increment added to the sleep after each attempt.
    pub poll_sleep_increment: Duration,
    /// Upper bound on the per-retry sleep.
    pub poll_sleep_cap: Duration,
    /// Bounded number of TCP connect attempts before a reconnect is fatal.
    pub connect_attempts: u32,
    /// Delay step between connect attempts (arithmetic backoff).
    pub connect_backoff_step: Duration,
    /// Minimum interval between keepalive payloads on one channel.
    pub keepalive_interval: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            bail_timeout: Duration::from_millis(2000),
            poll_sleep_initial: Duration::from_millis(1),
            poll_sleep_increment: Duration::from_millis(1),
            poll_sleep_cap: Duration::from_millis(50),
            connect_attempts: 3,
            connect_backoff_step: Duration::from_millis(250),
            keepalive_interval: Duration::from_secs(1),
        }
    }
}

impl TimingConfig {
    /// Advances a poll sleep by one arithmetic step, saturating at the cap.
    pub(crate) fn next_poll_sleep(&self, current: Duration) -> Duration {
        (current + self.poll_sleep_increment).min(self.poll_sleep_cap)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
