// Message types exchanged with the transport layer
//
// ControlState: operator -> vehicle (one per client frame)
// Hud: vehicle -> operator (display lines)

use serde::{Deserialize, Serialize};

/// Number of buttons packed into `ControlState::bit_buttons`
pub const BUTTON_COUNT: usize = 32;

/// Single-bit masks 1, 2, 4, 8, ... used to unpack the button bitmask
pub const BUTTON_MASKS: [u32; BUTTON_COUNT] = build_button_masks();

const fn build_button_masks() -> [u32; BUTTON_COUNT] {
    let mut masks = [0u32; BUTTON_COUNT];
    let mut i = 0;
    while i < BUTTON_COUNT {
        masks[i] = 1 << i;
        i += 1;
    }
    masks
}

/// Errors comparing button states
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ButtonError {
    #[error("button state length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("button index {index} out of bounds for {len} buttons")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// Command from an operator
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlState {
    pub axes: Vec<f64>,
    #[serde(rename = "bit_buttons", default)]
    pub bit_buttons: u32,
    /// Client clock, milliseconds
    #[serde(rename = "time_stamp")]
    pub timestamp: i64,
}

impl ControlState {
    pub fn new(axes: Vec<f64>, bit_buttons: u32, timestamp: i64) -> Self {
        Self {
            axes,
            bit_buttons,
            timestamp,
        }
    }

    /// Unpack the bitmask into 32 flags
    pub fn buttons(&self) -> ButtonFlags {
        ButtonFlags::from_bits(self.bit_buttons)
    }

    /// Axis value by protocol index, `None` if the client sent fewer axes
    pub fn axis(&self, index: usize) -> Option<f64> {
        self.axes.get(index).copied()
    }
}

/// Decoded button states, always exactly 32 long
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonFlags([bool; BUTTON_COUNT]);

impl ButtonFlags {
    pub fn from_bits(bits: u32) -> Self {
        let mut flags = [false; BUTTON_COUNT];
        for (flag, mask) in flags.iter_mut().zip(BUTTON_MASKS.iter()) {
            *flag = bits & mask != 0;
        }
        Self(flags)
    }

    pub fn is_pressed(&self, index: usize) -> Result<bool, ButtonError> {
        self.0
            .get(index)
            .copied()
            .ok_or(ButtonError::IndexOutOfBounds {
                index,
                len: BUTTON_COUNT,
            })
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }
}

impl TryFrom<&[bool]> for ButtonFlags {
    type Error = ButtonError;

    fn try_from(flags: &[bool]) -> Result<Self, Self::Error> {
        let flags: [bool; BUTTON_COUNT] =
            flags.try_into().map_err(|_| ButtonError::LengthMismatch {
                expected: BUTTON_COUNT,
                actual: flags.len(),
            })?;
        Ok(Self(flags))
    }
}

/// True only when `index` went from released to pressed between two frames
pub fn new_press(
    previous: &ButtonFlags,
    latest: &ButtonFlags,
    index: usize,
) -> Result<bool, ButtonError> {
    Ok(latest.is_pressed(index)? && !previous.is_pressed(index)?)
}

/// Telemetry shown to an operator
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Hud {
    pub lines: Vec<String>,
}

impl Hud {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }
}
