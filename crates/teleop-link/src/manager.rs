//! The channel registry and its orchestration policy.
//!
//! `ChannelManager` replaces the ad-hoc module-level socket and timestamp
//! maps of earlier clients with a single owned registry: one entry per
//! configured channel, keys fixed at startup, and the manager as the only
//! code path allowed to replace a connection. Teardown of an old
//! connection always completes before a new one is observable, so no
//! channel ever briefly has two live sockets.

use std::collections::HashMap;
use std::io;

use teleop_core::MAX_TELEGRAM_BYTES;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, trace, warn};

use crate::config::{ChannelConfig, TimingConfig};
use crate::connection::{Connection, ConnectionState, WaitError};
use crate::error::LinkError;

struct ChannelEntry {
    config: ChannelConfig,
    connection: Option<Connection>,
    last_keepalive_sent: Option<Instant>,
}

/// Owns every channel's connection and all reconnect/backoff policy.
pub struct ChannelManager {
    channels: HashMap<String, ChannelEntry>,
    timing: TimingConfig,
}

impl ChannelManager {
    /// Builds the registry from a fixed set of named channel configs,
    /// validating each config up front.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ConfigInvalid`] for any channel whose ack
    /// marker lacks an initial command — fatal before any connection
    /// attempt.
    pub fn new(
        configs: impl IntoIterator<Item = (String, ChannelConfig)>,
        timing: TimingConfig,
    ) -> Result<Self, LinkError> {
        let mut channels = HashMap::new();
        for (name, config) in configs {
            config.validate(&name)?;
            channels.insert(
                name,
                ChannelEntry {
                    config,
                    connection: None,
                    last_keepalive_sent: None,
                },
            );
        }
        Ok(Self { channels, timing })
    }

    /// The configured channel names, in no particular order.
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    /// Observable state of one channel's connection. A channel with no
    /// connection yet (or after teardown) reports `Disconnected`.
    pub fn state(&self, channel: &str) -> Result<ConnectionState, LinkError> {
        let entry = self.entry(channel)?;
        Ok(entry
            .connection
            .as_ref()
            .map_or(ConnectionState::Disconnected, Connection::state))
    }

    /// Connects every configured channel, in arbitrary order. Used at
    /// startup so the control loop begins with all channels ready.
    ///
    /// # Errors
    ///
    /// Propagates the first channel's fatal reconnect failure.
    pub async fn connect_all(&mut self) -> Result<(), LinkError> {
        for name in self.channel_names() {
            self.reconnect(&name).await?;
        }
        Ok(())
    }

    /// Sends one telegram on `channel`, reconnecting first if the channel
    /// is down and honouring the ack gate when one is configured.
    ///
    /// On an ack timeout or transmit failure the channel is reconnected
    /// once and the send retried exactly once more; a second failure is
    /// surfaced, never silently retried forever.
    ///
    /// # Errors
    ///
    /// [`LinkError::OversizedTelegram`] before any socket work for
    /// telegrams over the limit; otherwise the classified failure of the
    /// reconnect, ack wait, or transmit.
    pub async fn send(&mut self, channel: &str, telegram: &[u8]) -> Result<(), LinkError> {
        if telegram.len() > MAX_TELEGRAM_BYTES {
            return Err(LinkError::OversizedTelegram {
                size: telegram.len(),
            });
        }
        // Resolve the channel before any I/O so a typo cannot reconnect.
        self.entry(channel)?;
        self.ensure_connected(channel).await?;

        match self.send_once(channel, telegram).await {
            Ok(()) => Ok(()),
            Err(e) if e.retryable_once() => {
                warn!(channel, error = %e, "send failed; reconnecting for one retry");
                self.reconnect(channel).await?;
                self.send_once(channel, telegram).await
            }
            Err(e) => Err(e),
        }
    }

    /// Tears down `channel`'s current connection (best-effort courtesy
    /// message, shutdown, close) and runs the handshake machine from
    /// scratch, with a bounded number of connect attempts and arithmetic
    /// backoff between them.
    ///
    /// A post-greeting handshake timeout is fatal at once for channels
    /// without an initial-command fallback; with one, a single further
    /// attempt is made before the failure is surfaced.
    ///
    /// # Errors
    ///
    /// [`LinkError::ConnectFailure`] after the attempt budget, or the
    /// handshake failure per the policy above.
    pub async fn reconnect(&mut self, channel: &str) -> Result<(), LinkError> {
        let timing = self.timing.clone();
        let entry = self.entry_mut(channel)?;
        let config = entry.config.clone();

        if let Some(old) = entry.connection.take() {
            old.teardown(config.preshutdown.as_deref(), &timing).await;
        }

        let has_fallback = config.initial_command.is_some();
        let mut handshake_retry_used = false;
        let mut backoff = timing.connect_backoff_step;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match Connection::establish(channel, &config, &timing).await {
                Ok(conn) => {
                    let entry = self.entry_mut(channel)?;
                    entry.connection = Some(conn);
                    entry.last_keepalive_sent = Some(Instant::now());
                    info!(channel, address = %config.address, "channel ready");
                    return Ok(());
                }
                Err(err @ LinkError::HandshakeTimeout { .. }) => {
                    // Without an initial command there is no way to confirm
                    // a clean session after a silent handshake, so fail at
                    // once. With one, the fallback earns a single further
                    // attempt.
                    if !has_fallback || handshake_retry_used {
                        return Err(err);
                    }
                    handshake_retry_used = true;
                    warn!(channel, error = %err, "handshake timed out; retrying once");
                }
                Err(err) => {
                    if attempt >= timing.connect_attempts {
                        return Err(escalate(err, attempt));
                    }
                    warn!(channel, attempt, error = %err, "connect attempt failed; backing off");
                    sleep(backoff).await;
                    backoff += timing.connect_backoff_step;
                }
            }
        }
    }

    /// Keepalive scheduling: for every channel with a keepalive payload
    /// configured whose interval has elapsed since the last one, sends the
    /// payload through the normal `send` path (ack gate and reconnect
    /// included) and stamps `now`.
    ///
    /// # Errors
    ///
    /// Propagates a fatal send/reconnect failure for the affected channel.
    pub async fn tick(&mut self, now: Instant) -> Result<(), LinkError> {
        let due: Vec<(String, Vec<u8>)> = self
            .channels
            .iter()
            .filter_map(|(name, entry)| {
                let payload = entry.config.keepalive.clone()?;
                let elapsed = entry
                    .last_keepalive_sent
                    .map_or(true, |t| now.saturating_duration_since(t) >= self.timing.keepalive_interval);
                elapsed.then(|| (name.clone(), payload))
            })
            .collect();

        for (name, payload) in due {
            trace!(channel = %name, "keepalive due");
            self.send(&name, &payload).await?;
            if let Some(entry) = self.channels.get_mut(&name) {
                entry.last_keepalive_sent = Some(now);
            }
        }
        Ok(())
    }

    /// Bounded wait for the next `pos: <digits>\n` report on `channel`,
    /// returning the embedded servo position.
    ///
    /// # Errors
    ///
    /// [`LinkError::ResponseTimeout`] when no report arrives within the
    /// bail timeout; [`LinkError::DecodeFailure`] when a report is present
    /// but its digits are malformed (connection state unaffected).
    pub async fn read_position(&mut self, channel: &str) -> Result<u16, LinkError> {
        let timing = self.timing.clone();
        self.entry(channel)?;
        self.ensure_connected(channel).await?;

        let conn = self.live_connection(channel)?;
        conn.await_position(&timing).await.map_err(|e| match e {
            WaitError::Timeout { waited } => LinkError::ResponseTimeout {
                channel: channel.to_string(),
                waited_ms: waited.as_millis() as u64,
            },
            WaitError::Io(source) => LinkError::SendFailure {
                channel: channel.to_string(),
                source,
            },
            WaitError::Decode(source) => LinkError::DecodeFailure {
                channel: channel.to_string(),
                source,
            },
        })
    }

    /// Controlled-exit teardown of every channel: courtesy message, socket
    /// shutdown, close — each step independently best-effort.
    pub async fn shutdown_all(&mut self) {
        let timing = self.timing.clone();
        for (name, entry) in self.channels.iter_mut() {
            if let Some(conn) = entry.connection.take() {
                debug!(channel = %name, "shutting down channel");
                conn.teardown(entry.config.preshutdown.as_deref(), &timing)
                    .await;
            }
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────

    /// Reconnects when the channel has no live `Ready` connection.
    async fn ensure_connected(&mut self, channel: &str) -> Result<(), LinkError> {
        let down = {
            let entry = self.entry(channel)?;
            entry
                .connection
                .as_ref()
                .map_or(true, |c| c.state() != ConnectionState::Ready)
        };
        if down {
            self.reconnect(channel).await?;
        }
        Ok(())
    }

    /// One send attempt: ack gate (when configured) then transmit.
    async fn send_once(&mut self, channel: &str, telegram: &[u8]) -> Result<(), LinkError> {
        let timing = self.timing.clone();
        let ack = self.entry(channel)?.config.command_ack.clone();
        let conn = self.live_connection(channel)?;

        if let Some(marker) = ack {
            // At-most-one-inflight: the previous command's ack must be
            // observed before this telegram may race ahead of it.
            conn.wait_for_marker(&marker, &timing)
                .await
                .map_err(|e| match e {
                    WaitError::Timeout { waited } => LinkError::AckTimeout {
                        channel: channel.to_string(),
                        waited_ms: waited.as_millis() as u64,
                    },
                    WaitError::Io(source) => LinkError::SendFailure {
                        channel: channel.to_string(),
                        source,
                    },
                    WaitError::Decode(source) => LinkError::DecodeFailure {
                        channel: channel.to_string(),
                        source,
                    },
                })?;
        }

        conn.transmit(telegram, &timing)
            .await
            .map_err(|source| LinkError::SendFailure {
                channel: channel.to_string(),
                source,
            })
    }

    fn entry(&self, channel: &str) -> Result<&ChannelEntry, LinkError> {
        self.channels
            .get(channel)
            .ok_or_else(|| LinkError::UnknownChannel(channel.to_string()))
    }

    fn entry_mut(&mut self, channel: &str) -> Result<&mut ChannelEntry, LinkError> {
        self.channels
            .get_mut(channel)
            .ok_or_else(|| LinkError::UnknownChannel(channel.to_string()))
    }

    fn live_connection(&mut self, channel: &str) -> Result<&mut Connection, LinkError> {
        let entry = self.entry_mut(channel)?;
        entry
            .connection
            .as_mut()
            .ok_or_else(|| LinkError::SendFailure {
                channel: channel.to_string(),
                source: io::Error::new(io::ErrorKind::NotConnected, "channel not connected"),
            })
    }
}

fn escalate(err: LinkError, attempts: u32) -> LinkError {
    match err {
        LinkError::ConnectFailure {
            channel,
            address,
            source,
            ..
        } => LinkError::ConnectFailure {
            channel,
            address,
            attempts,
            source,
        },
        other => other,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
