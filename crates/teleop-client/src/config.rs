//! TOML configuration for the teleop client.
//!
//! Everything an operator tunes lives here: channel addresses, the bail
//! timeout, keepalive interval, connect budget, and the neck's travel
//! limits. Fields carry `#[serde(default = "...")]` helpers so a partial
//! (or absent) config file still produces a working setup, and upgrades
//! that add fields never break an existing file.
//!
//! ```toml
//! [neck]
//! address = "192.168.20.126:7777"
//!
//! [rover]
//! address = "192.168.20.128:8888"
//!
//! [timing]
//! bail_timeout_ms = 2000
//! keepalive_interval_ms = 1000
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use teleop_link::{ChannelConfig, TimingConfig};
use thiserror::Error;

use crate::control_loop::LoopSettings;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A channel address is not a valid `host:port` socket address.
    #[error("channel {channel}: invalid address {value:?}")]
    BadAddress { channel: String, value: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub timing: TimingSection,
    #[serde(default)]
    pub neck: NeckSection,
    #[serde(default)]
    pub rover: RoverSection,
}

/// General client behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientSection {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Control loop tick sleep in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

/// Timing tunables mapped onto the channel layer's [`TimingConfig`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingSection {
    /// Upper bound on any bounded wait, in milliseconds.
    #[serde(default = "default_bail_timeout_ms")]
    pub bail_timeout_ms: u64,
    /// Minimum interval between keepalive payloads, in milliseconds.
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
    /// Bounded number of TCP connect attempts before a reconnect is fatal.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// Delay step between connect attempts, in milliseconds.
    #[serde(default = "default_connect_backoff_ms")]
    pub connect_backoff_ms: u64,
}

/// The pan-servo channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NeckSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_neck_address")]
    pub address: String,
    /// Leftmost servo position in degrees.
    #[serde(default = "default_neck_min")]
    pub min_degrees: u16,
    /// Rightmost servo position in degrees.
    #[serde(default = "default_neck_max")]
    pub max_degrees: u16,
    /// Degrees per step command.
    #[serde(default = "default_neck_step")]
    pub step_degrees: u16,
}

/// The differential-drive channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoverSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rover_address")]
    pub address: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_tick_interval_ms() -> u64 {
    1
}
fn default_bail_timeout_ms() -> u64 {
    2000
}
fn default_keepalive_interval_ms() -> u64 {
    1000
}
fn default_connect_attempts() -> u32 {
    3
}
fn default_connect_backoff_ms() -> u64 {
    250
}
fn default_true() -> bool {
    true
}
fn default_neck_address() -> String {
    "192.168.20.126:7777".to_string()
}
fn default_rover_address() -> String {
    "192.168.20.128:8888".to_string()
}
fn default_neck_min() -> u16 {
    30
}
fn default_neck_max() -> u16 {
    140
}
fn default_neck_step() -> u16 {
    5
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            bail_timeout_ms: default_bail_timeout_ms(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            connect_attempts: default_connect_attempts(),
            connect_backoff_ms: default_connect_backoff_ms(),
        }
    }
}

impl Default for NeckSection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            address: default_neck_address(),
            min_degrees: default_neck_min(),
            max_degrees: default_neck_max(),
            step_degrees: default_neck_step(),
        }
    }
}

impl Default for RoverSection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            address: default_rover_address(),
        }
    }
}

// ── Derived channel-layer settings ────────────────────────────────────────────

impl AppConfig {
    /// Builds the channel-layer timing tunables from the TOML values,
    /// keeping the layer's defaults for the fine-grained poll sleeps.
    pub fn timing(&self) -> TimingConfig {
        TimingConfig {
            bail_timeout: Duration::from_millis(self.timing.bail_timeout_ms),
            keepalive_interval: Duration::from_millis(self.timing.keepalive_interval_ms),
            connect_attempts: self.timing.connect_attempts,
            connect_backoff_step: Duration::from_millis(self.timing.connect_backoff_ms),
            ..TimingConfig::default()
        }
    }

    /// Builds the named channel configs for every enabled channel.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BadAddress`] when an enabled channel's
    /// address is not a valid socket address.
    pub fn channel_configs(&self) -> Result<Vec<(String, ChannelConfig)>, ConfigError> {
        let mut channels = Vec::new();
        if self.neck.enabled {
            let address = parse_address("neck", &self.neck.address)?;
            channels.push(("neck".to_string(), ChannelConfig::neck(address)));
        }
        if self.rover.enabled {
            let address = parse_address("rover", &self.rover.address)?;
            channels.push(("rover".to_string(), ChannelConfig::rover(address)));
        }
        Ok(channels)
    }

    /// Builds the control-loop settings matching the enabled channels.
    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            tick_interval: Duration::from_millis(self.client.tick_interval_ms),
            neck_channel: self.neck.enabled.then(|| "neck".to_string()),
            rover_channel: self.rover.enabled.then(|| "rover".to_string()),
            neck_min_degrees: self.neck.min_degrees,
            neck_max_degrees: self.neck.max_degrees,
            neck_step_degrees: self.neck.step_degrees,
        }
    }
}

fn parse_address(channel: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|_| ConfigError::BadAddress {
        channel: channel.to_string(),
        value: value.to_string(),
    })
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Loads the config from `path`, or returns `AppConfig::default()` when
/// `path` is `None` and no file exists at the default location
/// (`$XDG_CONFIG_HOME/teleop/config.toml` or `~/.config/teleop/config.toml`).
///
/// An explicitly given path must exist; a missing default-location file is
/// normal on first run.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors (including a missing
/// explicit path) and [`ConfigError::Parse`] for malformed TOML.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let (path, missing_ok) = match path {
        Some(p) => (p.to_path_buf(), false),
        None => match default_config_path() {
            Some(p) => (p, true),
            None => return Ok(AppConfig::default()),
        },
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if missing_ok && e.kind() == std::io::ErrorKind::NotFound => {
            Ok(AppConfig::default())
        }
        Err(source) => Err(ConfigError::Io { path, source }),
    }
}

/// `$XDG_CONFIG_HOME/teleop/config.toml`, falling back to `~/.config`.
fn default_config_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join("teleop").join("config.toml"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
