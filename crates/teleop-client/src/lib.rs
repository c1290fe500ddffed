//! # teleop-client
//!
//! The control-loop application of the robot teleop client: an input
//! source abstraction (the seam behind which a physical gamepad lives),
//! a pure encoder from input state to command telegrams, the fixed-tick
//! control loop that drives the channel manager, and the TOML
//! configuration that wires it all together.

pub mod config;
pub mod control_loop;
pub mod encoder;
pub mod input;

pub use config::{load_config, AppConfig, ConfigError};
pub use control_loop::{ControlLoop, LoopSettings};
pub use input::{InputSource, InputState};
