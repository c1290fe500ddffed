//! The fixed-tick control loop.
//!
//! Each tick: poll the input source, honour the quit button, let the
//! channel manager send any due keepalives, then translate the control
//! snapshot into neck and rover telegrams. The loop is the only driver
//! of the channel manager, so per-channel command ordering is simply
//! call order.

use std::time::Duration;

use teleop_core::{DriveTelegram, NeckTelegram};
use teleop_link::{ChannelManager, LinkError};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::encoder::{self, DriveCommand};
use crate::input::{InputSource, InputState};

/// Loop wiring: which channels exist and the neck's mechanical limits.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Sleep between ticks.
    pub tick_interval: Duration,
    /// Channel name for the pan servo, if enabled.
    pub neck_channel: Option<String>,
    /// Channel name for the drive chassis, if enabled.
    pub rover_channel: Option<String>,
    /// Leftmost neck position in degrees.
    pub neck_min_degrees: u16,
    /// Rightmost neck position in degrees.
    pub neck_max_degrees: u16,
    /// Degrees the servo moves per step command.
    pub neck_step_degrees: u16,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1),
            neck_channel: Some("neck".to_string()),
            rover_channel: Some("rover".to_string()),
            neck_min_degrees: 30,
            neck_max_degrees: 140,
            neck_step_degrees: 5,
        }
    }
}

/// Drives the channel manager from an input source until the operator
/// quits or a channel fails fatally.
pub struct ControlLoop<I: InputSource> {
    manager: ChannelManager,
    input: I,
    settings: LoopSettings,
    /// Last servo position reported by the neck; unknown until the first
    /// position report arrives.
    neck_degrees: Option<u16>,
    /// Whether a non-stop drive telegram has gone out since the last
    /// stop. Gates the explicit stop on control release.
    rover_moving: bool,
}

impl<I: InputSource> ControlLoop<I> {
    pub fn new(manager: ChannelManager, input: I, settings: LoopSettings) -> Self {
        Self {
            manager,
            input,
            settings,
            neck_degrees: None,
            rover_moving: false,
        }
    }

    /// Connects every channel, runs the tick loop until quit, then tears
    /// everything down.
    ///
    /// # Errors
    ///
    /// Propagates the first fatal channel failure; transient failures are
    /// already absorbed by the manager's reconnect-once policy.
    pub async fn run(mut self) -> Result<(), LinkError> {
        self.manager.connect_all().await?;
        info!("all channels connected; entering control loop");

        loop {
            let state = self.input.poll();
            if state.quit {
                info!("quit requested");
                break;
            }

            self.manager.tick(Instant::now()).await?;
            self.step(&state).await?;

            sleep(self.settings.tick_interval).await;
        }

        self.manager.shutdown_all().await;
        Ok(())
    }

    /// One tick's worth of command traffic: neck first, then rover.
    async fn step(&mut self, state: &InputState) -> Result<(), LinkError> {
        if let Some(channel) = self.settings.neck_channel.clone() {
            self.step_neck(&channel, state).await?;
        }
        if let Some(channel) = self.settings.rover_channel.clone() {
            self.step_rover(&channel, state).await?;
        }
        Ok(())
    }

    async fn step_neck(&mut self, channel: &str, state: &InputState) -> Result<(), LinkError> {
        let Some(command) = encoder::neck_command(state) else {
            return Ok(());
        };

        if !self.neck_step_allowed(command) {
            debug!(channel, degrees = ?self.neck_degrees, "neck at mechanical limit; step suppressed");
            return Ok(());
        }

        self.manager.send(channel, &command.encode()).await?;

        // A missed report means the session is suspect: reconnect and
        // re-issue the step once before the failure is surfaced.
        let reported = match self.manager.read_position(channel).await {
            Ok(reported) => reported,
            Err(LinkError::ResponseTimeout { .. }) => {
                warn!(channel, "no position report; reconnecting for one retry");
                self.manager.reconnect(channel).await?;
                self.manager.send(channel, &command.encode()).await?;
                self.manager.read_position(channel).await?
            }
            Err(e) => return Err(e),
        };
        let tracked = reported.clamp(
            self.settings.neck_min_degrees,
            self.settings.neck_max_degrees,
        );
        debug!(channel, reported, tracked, "neck position updated");
        self.neck_degrees = Some(tracked);
        Ok(())
    }

    /// Whether a step in `command`'s direction stays inside the servo's
    /// travel. Before the first position report the limits cannot be
    /// checked, so the step is allowed and the report syncs the tracker.
    fn neck_step_allowed(&self, command: NeckTelegram) -> bool {
        let step = self.settings.neck_step_degrees;
        match (command, self.neck_degrees) {
            (NeckTelegram::Left, Some(degrees)) => {
                degrees.saturating_sub(step) >= self.settings.neck_min_degrees
            }
            (NeckTelegram::Right, Some(degrees)) => {
                degrees.saturating_add(step) <= self.settings.neck_max_degrees
            }
            _ => true,
        }
    }

    async fn step_rover(&mut self, channel: &str, state: &InputState) -> Result<(), LinkError> {
        match encoder::drive_command(state, self.rover_moving) {
            DriveCommand::Move(telegram) => {
                self.manager.send(channel, &telegram.encode()).await?;
                self.rover_moving = telegram != DriveTelegram::STOP;
            }
            DriveCommand::Stop => {
                self.manager.send(channel, &DriveTelegram::STOP.encode()).await?;
                self.rover_moving = false;
            }
            DriveCommand::Coast => {}
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
