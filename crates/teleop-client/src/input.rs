//! Input source abstraction.
//!
//! Physical controller acquisition (gamepad APIs, event pumps) lives
//! behind the [`InputSource`] trait so the control loop can be exercised
//! with a scripted source in tests. A production build plugs in a real
//! gamepad implementation; nothing in this crate touches device APIs.

#[cfg(test)]
use mockall::automock;

/// One polled snapshot of the operator's controls.
///
/// Axis values are normalised to `-1.0..=1.0` with positive meaning
/// "stick pushed forward". Values inside the deadzone are treated as
/// centred by the encoder, not here.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputState {
    /// Left analog stick, vertical axis.
    pub left_stick_y: f32,
    /// Right analog stick, vertical axis.
    pub right_stick_y: f32,
    pub dpad_up: bool,
    pub dpad_down: bool,
    pub dpad_left: bool,
    pub dpad_right: bool,
    /// Bottom-left trigger: pan the neck left.
    pub neck_left: bool,
    /// Bottom-right trigger: pan the neck right.
    pub neck_right: bool,
    /// Quit button: exit the control loop cleanly.
    pub quit: bool,
}

/// Anything that can be polled for the current control state once per
/// loop tick.
#[cfg_attr(test, automock)]
pub trait InputSource {
    /// Returns the current snapshot of the operator's controls. Called
    /// once per tick; must not block.
    fn poll(&mut self) -> InputState;
}

/// Replays a fixed sequence of input states, then repeats the final one
/// (with `quit` forced on once the script is exhausted, so loops driven
/// by a script always terminate).
pub struct ScriptedInput {
    script: Vec<InputState>,
    cursor: usize,
}

impl ScriptedInput {
    pub fn new(script: Vec<InputState>) -> Self {
        Self { script, cursor: 0 }
    }
}

impl InputSource for ScriptedInput {
    fn poll(&mut self) -> InputState {
        match self.script.get(self.cursor) {
            Some(state) => {
                self.cursor += 1;
                *state
            }
            None => InputState {
                quit: true,
                ..InputState::default()
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_input_replays_in_order_then_quits() {
        let forward = InputState {
            left_stick_y: 1.0,
            ..InputState::default()
        };
        let mut source = ScriptedInput::new(vec![forward, InputState::default()]);

        assert_eq!(source.poll(), forward);
        assert_eq!(source.poll(), InputState::default());
        assert!(source.poll().quit, "exhausted script must request quit");
        assert!(source.poll().quit);
    }

    #[test]
    fn test_mock_input_source_is_pollable() {
        let mut mock = MockInputSource::new();
        mock.expect_poll().times(1).returning(|| InputState {
            quit: true,
            ..InputState::default()
        });
        assert!(mock.poll().quit);
    }
}
