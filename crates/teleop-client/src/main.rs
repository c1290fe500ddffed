//! Teleop client entry point.
//!
//! Loads the TOML config, wires the channel manager and control loop
//! together, and maps each fatal failure category to its own process
//! exit status:
//!
//! - `2` — invalid configuration
//! - `3` — connect failure after the attempt budget
//! - `4` — handshake failure
//! - `5` — ack/response timeout
//! - `6` — send failure
//!
//! The physical gamepad lives behind the [`InputSource`] seam; this
//! binary runs with a signal-driven placeholder source (keepalives and
//! reconnects stay exercised, Ctrl+C quits) until a controller backend
//! is plugged in.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use teleop_client::config::load_config;
use teleop_client::control_loop::ControlLoop;
use teleop_client::input::{InputSource, InputState};
use teleop_link::ChannelManager;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Robot teleop client: drives the neck and rover command channels.
#[derive(Debug, Parser)]
#[command(
    name = "teleop-client",
    about = "Resilient TCP command-channel client for the robot avatar",
    version
)]
struct Cli {
    /// Path to the TOML config file. Defaults to
    /// `$XDG_CONFIG_HOME/teleop/config.toml`; a missing default file is
    /// replaced by built-in defaults.
    #[arg(long, env = "TELEOP_CONFIG")]
    config: Option<PathBuf>,

    /// Override the neck channel address (`host:port`).
    #[arg(long, env = "TELEOP_NECK_ADDR")]
    neck_addr: Option<String>,

    /// Override the rover channel address (`host:port`).
    #[arg(long, env = "TELEOP_ROVER_ADDR")]
    rover_addr: Option<String>,

    /// Run without the neck channel.
    #[arg(long)]
    disable_neck: bool,

    /// Run without the rover channel.
    #[arg(long)]
    disable_rover: bool,
}

// ── Placeholder input source ──────────────────────────────────────────────────

/// Reports centred controls until the shutdown flag flips, then requests
/// quit. Stands in for a real gamepad backend.
struct SignalQuitInput {
    running: Arc<AtomicBool>,
}

impl InputSource for SignalQuitInput {
    fn poll(&mut self) -> InputState {
        InputState {
            quit: !self.running.load(Ordering::Relaxed),
            ..InputState::default()
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(2);
        }
    };

    // `RUST_LOG` wins over the configured log level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.client.log_level)),
        )
        .init();

    if let Some(addr) = cli.neck_addr {
        config.neck.address = addr;
    }
    if let Some(addr) = cli.rover_addr {
        config.rover.address = addr;
    }
    if cli.disable_neck {
        config.neck.enabled = false;
    }
    if cli.disable_rover {
        config.rover.enabled = false;
    }

    let channels = match config.channel_configs() {
        Ok(channels) => channels,
        Err(e) => {
            error!("configuration error: {e}");
            std::process::exit(2);
        }
    };
    if channels.is_empty() {
        error!("no channels enabled; nothing to drive");
        std::process::exit(2);
    }

    let manager = match ChannelManager::new(channels, config.timing()) {
        Ok(manager) => manager,
        Err(e) => {
            error!("configuration error: {e}");
            std::process::exit(e.exit_code());
        }
    };

    // Ctrl+C flips the running flag; the control loop sees it as a quit
    // press on its next tick.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            running_clone.store(false, Ordering::Relaxed);
        }
    });

    info!("teleop client starting");
    let input = SignalQuitInput { running };
    let control = ControlLoop::new(manager, input, config.loop_settings());

    match control.run().await {
        Ok(()) => {
            info!("teleop client stopped");
            Ok(())
        }
        Err(e) => {
            error!("fatal channel failure: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
