//! Pure mapping from polled input state to command telegrams.
//!
//! No I/O here: given a control snapshot and whether the rover is
//! currently moving, these functions decide which telegram (if any) the
//! control loop should send this tick.
//!
//! # Drive modes
//!
//! - **Independent drive** (analog sticks): each stick drives one motor,
//!   `speed = |axis| * 150 + 50`, sign from the stick direction. The
//!   sticks are crossed to the telegram fields the way the chassis is
//!   wired: the right stick feeds the first (left-motor) field.
//! - **Naive drive** (d-pad): fixed full/half speeds for forward,
//!   reverse, pivot turns, and advancing turns. Sticks take precedence
//!   over the d-pad.
//!
//! Releasing all drive controls while the rover is moving produces one
//! explicit stop telegram; an idle rover produces nothing at all.

use teleop_core::{DriveTelegram, NeckTelegram};

use crate::input::InputState;

/// Stick excursions below this magnitude read as centred.
pub const STICK_DEADZONE: f32 = 0.1;

/// Full speed for d-pad (naive) drive.
pub const NAIVE_MOVE_SPEED: i16 = 100;

/// Half speed for the inner wheel of an advancing turn.
pub const NAIVE_HALF_SPEED: i16 = 50;

const STICK_SPEED_SCALE: f32 = 150.0;
const STICK_SPEED_FLOOR: i16 = 50;

/// What the control loop should do with the rover this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveCommand {
    /// Send this drive telegram.
    Move(DriveTelegram),
    /// Controls were just released: send one explicit stop.
    Stop,
    /// Nothing to send.
    Coast,
}

/// Decides the rover command for one tick. `rover_moving` is the loop's
/// record of whether a non-stop telegram has been sent since the last
/// stop; it gates the explicit-stop-on-release behaviour.
pub fn drive_command(state: &InputState, rover_moving: bool) -> DriveCommand {
    if sticks_active(state) {
        // Crossed wiring: right stick -> left-motor field.
        let telegram = DriveTelegram::new(
            stick_speed(state.right_stick_y),
            stick_speed(state.left_stick_y),
        )
        .unwrap_or(DriveTelegram::STOP);
        return DriveCommand::Move(telegram);
    }

    if let Some(telegram) = dpad_drive(state) {
        return DriveCommand::Move(telegram);
    }

    if rover_moving {
        DriveCommand::Stop
    } else {
        DriveCommand::Coast
    }
}

/// Decides the neck command for one tick. The left trigger wins when
/// both are held.
pub fn neck_command(state: &InputState) -> Option<NeckTelegram> {
    if state.neck_left {
        Some(NeckTelegram::Left)
    } else if state.neck_right {
        Some(NeckTelegram::Right)
    } else {
        None
    }
}

fn sticks_active(state: &InputState) -> bool {
    state.left_stick_y.abs() >= STICK_DEADZONE || state.right_stick_y.abs() >= STICK_DEADZONE
}

/// Maps one stick axis to a signed motor speed. A centred stick yields
/// zero; any deflection past the deadzone yields at least the floor
/// speed, since the motors stall below it.
fn stick_speed(axis: f32) -> i16 {
    if axis.abs() < STICK_DEADZONE {
        return 0;
    }
    let clamped = axis.clamp(-1.0, 1.0);
    let magnitude = (clamped.abs() * STICK_SPEED_SCALE) as i16 + STICK_SPEED_FLOOR;
    if clamped < 0.0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Naive d-pad drive. Turns take precedence over forward/reverse; a held
/// up/down combines with a turn into an advancing turn (inner wheel at
/// half speed).
fn dpad_drive(state: &InputState) -> Option<DriveTelegram> {
    let full = NAIVE_MOVE_SPEED;
    let half = NAIVE_HALF_SPEED;

    let (left, right) = if state.dpad_left {
        if state.dpad_up {
            (full, half)
        } else if state.dpad_down {
            (-full, -half)
        } else {
            (full, -full)
        }
    } else if state.dpad_right {
        if state.dpad_up {
            (half, full)
        } else if state.dpad_down {
            (-half, -full)
        } else {
            (-full, full)
        }
    } else if state.dpad_up {
        (full, full)
    } else if state.dpad_down {
        (-full, -full)
    } else {
        return None;
    };

    // Naive speeds are fixed well inside the 3-digit field.
    DriveTelegram::new(left, right).ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
