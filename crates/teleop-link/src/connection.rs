//! One TCP connection to one channel, and its handshake state machine.
//!
//! A `Connection` exclusively owns its socket and read buffer. It is
//! created by [`Connection::establish`], which drives the handshake to the
//! `Ready` state or fails; a failed connection is never reused — the
//! manager tears it down and constructs a brand-new one.
//!
//! # Bounded waits
//!
//! Every wait (pre/post-greeting marker, command ack, position report)
//! uses the same algorithm: attempt a non-blocking receive, append any
//! bytes to the read buffer, check for the target, then sleep a short,
//! arithmetically increasing interval before retrying. The wait aborts
//! once total elapsed time exceeds the bail timeout. Receive-would-block
//! is "no data yet", not a failure; EOF and connection-reset fail the
//! connection immediately.

use std::io;
use std::time::Duration;

use teleop_core::position::DecodeError;
use teleop_core::{find_subslice, scan_position};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace, warn};

use crate::config::{ChannelConfig, TimingConfig};
use crate::error::LinkError;

/// Lifecycle state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingPreGreeting,
    Handshaking,
    AwaitingPostGreeting,
    Ready,
    /// Terminal for this instance; the manager must build a fresh
    /// `Connection` to retry.
    Failed,
}

/// Outcome of a bounded wait, before the manager assigns it an error
/// category (handshake vs. ack vs. response).
#[derive(Debug)]
pub(crate) enum WaitError {
    Timeout { waited: Duration },
    Io(io::Error),
    Decode(DecodeError),
}

/// One channel's socket plus the inbound bytes not yet consumed by a
/// marker match.
#[derive(Debug)]
pub struct Connection {
    channel: String,
    stream: TcpStream,
    state: ConnectionState,
    read_buffer: Vec<u8>,
    last_activity: Instant,
}

impl Connection {
    /// Opens a socket to `config.address` and drives the handshake to
    /// `Ready`: optional pre-greeting marker, greeting, optional
    /// post-greeting marker, then the optional initial command (which
    /// bypasses the ack gate — there is no prior in-flight command).
    ///
    /// Nagle's algorithm is disabled: coalescing delay is unacceptable in
    /// a teleoperation control loop.
    ///
    /// # Errors
    ///
    /// [`LinkError::ConnectFailure`] when the TCP connect fails or the
    /// socket errors mid-handshake, [`LinkError::HandshakeTimeout`] when a
    /// greeting marker is not observed within the bail timeout, and
    /// [`LinkError::SendFailure`] when the greeting or initial command
    /// cannot be transmitted.
    pub(crate) async fn establish(
        channel: &str,
        config: &ChannelConfig,
        timing: &TimingConfig,
    ) -> Result<Self, LinkError> {
        debug!(channel, address = %config.address, "connecting");

        let stream =
            match tokio::time::timeout(timing.bail_timeout, TcpStream::connect(config.address))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(source)) => {
                    return Err(LinkError::ConnectFailure {
                        channel: channel.to_string(),
                        address: config.address,
                        attempts: 1,
                        source,
                    })
                }
                Err(_) => {
                    return Err(LinkError::ConnectFailure {
                        channel: channel.to_string(),
                        address: config.address,
                        attempts: 1,
                        source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                    })
                }
            };

        stream
            .set_nodelay(true)
            .map_err(|source| LinkError::ConnectFailure {
                channel: channel.to_string(),
                address: config.address,
                attempts: 1,
                source,
            })?;

        let mut conn = Self {
            channel: channel.to_string(),
            stream,
            state: ConnectionState::Connecting,
            read_buffer: Vec::new(),
            last_activity: Instant::now(),
        };

        if let Some(marker) = &config.await_before_greeting {
            conn.enter_state(ConnectionState::AwaitingPreGreeting);
            conn.handshake_wait(marker, config, timing).await?;
        }

        conn.enter_state(ConnectionState::Handshaking);
        if let Some(greeting) = &config.greeting {
            conn.transmit(greeting, timing)
                .await
                .map_err(|source| LinkError::SendFailure {
                    channel: channel.to_string(),
                    source,
                })?;
        }

        if let Some(marker) = &config.await_after_greeting {
            conn.enter_state(ConnectionState::AwaitingPostGreeting);
            conn.handshake_wait(marker, config, timing).await?;
        }

        conn.enter_state(ConnectionState::Ready);
        if let Some(command) = &config.initial_command {
            conn.transmit(command, timing)
                .await
                .map_err(|source| LinkError::SendFailure {
                    channel: channel.to_string(),
                    source,
                })?;
        }

        debug!(channel, "channel ready");
        Ok(conn)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Time since the last byte moved in either direction.
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    fn enter_state(&mut self, next: ConnectionState) {
        trace!(channel = %self.channel, from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }

    /// Maps a handshake-phase wait outcome to its error category.
    async fn handshake_wait(
        &mut self,
        marker: &[u8],
        config: &ChannelConfig,
        timing: &TimingConfig,
    ) -> Result<(), LinkError> {
        self.wait_for_marker(marker, timing)
            .await
            .map_err(|e| match e {
                WaitError::Timeout { waited } => LinkError::HandshakeTimeout {
                    channel: self.channel.clone(),
                    marker: String::from_utf8_lossy(marker).into_owned(),
                    waited_ms: waited.as_millis() as u64,
                },
                WaitError::Io(source) => LinkError::ConnectFailure {
                    channel: self.channel.clone(),
                    address: config.address,
                    attempts: 1,
                    source,
                },
                // wait_for_marker never decodes payloads
                WaitError::Decode(source) => LinkError::DecodeFailure {
                    channel: self.channel.clone(),
                    source,
                },
            })
    }

    /// Bounded wait until `marker` appears in the inbound stream. On a
    /// match, the buffer prefix through the marker is consumed.
    pub(crate) async fn wait_for_marker(
        &mut self,
        marker: &[u8],
        timing: &TimingConfig,
    ) -> Result<(), WaitError> {
        let start = Instant::now();
        let mut nap = timing.poll_sleep_initial;
        loop {
            self.drain_inbound()?;

            if let Some(at) = find_subslice(&self.read_buffer, marker) {
                self.read_buffer.drain(..at + marker.len());
                trace!(channel = %self.channel, marker = ?String::from_utf8_lossy(marker), "marker observed");
                return Ok(());
            }

            let waited = start.elapsed();
            if waited >= timing.bail_timeout {
                warn!(
                    channel = %self.channel,
                    marker = ?String::from_utf8_lossy(marker),
                    waited_ms = waited.as_millis() as u64,
                    buffered = self.read_buffer.len(),
                    "bail timeout waiting for marker"
                );
                return Err(WaitError::Timeout { waited });
            }

            sleep(nap).await;
            nap = timing.next_poll_sleep(nap);
        }
    }

    /// Bounded wait for a `pos: <digits>\n` report in the inbound stream.
    /// On a match, the consumed prefix (through the newline) is trimmed.
    pub(crate) async fn await_position(
        &mut self,
        timing: &TimingConfig,
    ) -> Result<u16, WaitError> {
        let start = Instant::now();
        let mut nap = timing.poll_sleep_initial;
        loop {
            self.drain_inbound()?;

            match scan_position(&self.read_buffer) {
                Ok(Some(m)) => {
                    self.read_buffer.drain(..m.consumed);
                    trace!(channel = %self.channel, degrees = m.degrees, "position report observed");
                    return Ok(m.degrees);
                }
                Ok(None) => {}
                Err(e) => return Err(WaitError::Decode(e)),
            }

            let waited = start.elapsed();
            if waited >= timing.bail_timeout {
                return Err(WaitError::Timeout { waited });
            }

            sleep(nap).await;
            nap = timing.next_poll_sleep(nap);
        }
    }

    /// Pulls every readily available byte into the read buffer.
    ///
    /// Would-block means "no data yet" and stops the drain; EOF and any
    /// other socket error fail the connection.
    fn drain_inbound(&mut self) -> Result<usize, WaitError> {
        let mut chunk = [0u8; 1024];
        let mut total = 0;
        loop {
            match self.stream.try_read(&mut chunk) {
                Ok(0) => {
                    self.state = ConnectionState::Failed;
                    return Err(WaitError::Io(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        "peer closed the connection",
                    )));
                }
                Ok(n) => {
                    self.read_buffer.extend_from_slice(&chunk[..n]);
                    self.last_activity = Instant::now();
                    total += n;
                    trace!(
                        channel = %self.channel,
                        received = n,
                        payload = ?String::from_utf8_lossy(&chunk[..n]),
                        "received bytes"
                    );
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    self.state = ConnectionState::Failed;
                    return Err(WaitError::Io(e));
                }
            }
        }
        Ok(total)
    }

    /// Transmits `bytes` in full, or fails. Would-block pauses with the
    /// arithmetic-backoff sleep until the bail timeout; a partial write is
    /// never reported as success.
    pub(crate) async fn transmit(
        &mut self,
        bytes: &[u8],
        timing: &TimingConfig,
    ) -> Result<(), io::Error> {
        let start = Instant::now();
        let mut nap = timing.poll_sleep_initial;
        let mut sent = 0;
        while sent < bytes.len() {
            match self.stream.try_write(&bytes[sent..]) {
                Ok(0) => {
                    self.state = ConnectionState::Failed;
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "socket accepted zero bytes",
                    ));
                }
                Ok(n) => {
                    sent += n;
                    self.last_activity = Instant::now();
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if start.elapsed() >= timing.bail_timeout {
                        self.state = ConnectionState::Failed;
                        return Err(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "send stalled past the bail timeout",
                        ));
                    }
                    sleep(nap).await;
                    nap = timing.next_poll_sleep(nap);
                }
                Err(e) => {
                    self.state = ConnectionState::Failed;
                    return Err(e);
                }
            }
        }
        debug!(
            channel = %self.channel,
            sent = bytes.len(),
            payload = ?String::from_utf8_lossy(bytes),
            "sent telegram"
        );
        Ok(())
    }

    /// Best-effort teardown: optional courtesy message, socket shutdown,
    /// then close on drop. Each step's result is discarded — failures here
    /// must not block the replacement connection.
    pub(crate) async fn teardown(mut self, preshutdown: Option<&[u8]>, timing: &TimingConfig) {
        debug!(
            channel = %self.channel,
            state = ?self.state,
            idle_ms = self.idle_time().as_millis() as u64,
            "tearing down connection"
        );
        if let Some(message) = preshutdown {
            let _ = self.transmit(message, timing).await;
        }
        let _ = self.stream.shutdown().await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
