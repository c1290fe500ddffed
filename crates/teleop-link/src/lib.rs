//! # teleop-link
//!
//! The resilient command-channel layer of the teleop client. A *channel*
//! is one independently addressed remote endpoint (the pan-servo "neck",
//! the differential-drive "rover") with its own TCP socket and its own
//! protocol quirks, described declaratively by a [`ChannelConfig`].
//!
//! The [`ChannelManager`] owns one [`Connection`] per channel and is the
//! only code path that may replace one. It enforces the rules that keep an
//! unattended control loop protocol-correct against unreliable peers:
//!
//! - handshake sequencing (optional pre-greeting marker → greeting →
//!   optional post-greeting marker) before a channel is considered ready;
//! - at-most-one-inflight-command per channel: when an ack marker is
//!   configured, a new telegram is never transmitted before the previous
//!   command's ack has been observed in the inbound stream;
//! - every blocking wait is bounded by a tunable bail timeout, so a frozen
//!   peer can stall one call, never the process;
//! - disconnects are detected and recovered with a bounded number of
//!   reconnect attempts; a failed connection is torn down completely and
//!   replaced, never partially reused.
//!
//! There is no background task servicing sockets: all I/O is non-blocking
//! attempts separated by short, arithmetically increasing sleeps, driven
//! from whichever task calls into the manager. Commands on one channel are
//! transmitted in call order; channels are independent of each other.

pub mod config;
pub mod connection;
pub mod error;
pub mod manager;

pub use config::{ChannelConfig, TimingConfig};
pub use connection::{Connection, ConnectionState};
pub use error::LinkError;
pub use manager::ChannelManager;
