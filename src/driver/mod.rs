// Command driver: the hardware actuation contract
//
// Provides:
// - DriverCommand, the unit sent to hardware every tick
// - CommandDriver trait (init / set / set_many / stop)
// - Per-channel pulse mapping shared by every implementation
// - An in-memory driver, plus PCA9685 and Raspberry Pi PWM drivers behind features

#[cfg(feature = "pca9685")]
pub mod pca9685;
#[cfg(feature = "pi-pwm")]
pub mod pi_pwm;
mod servo;
pub mod sim;

pub use servo::{ServoBank, ServoChannel};
pub use sim::{SimDriver, SimRecord};

/// One named, bounded actuation value
#[derive(Debug, Clone, PartialEq)]
pub struct DriverCommand {
    pub name: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

impl DriverCommand {
    pub fn new(name: impl Into<String>, value: f64, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            value,
            min,
            max,
        }
    }
}

/// Error types for command drivers
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("hardware bus error: {0}")]
    Bus(String),

    #[error("failed writing channel {channel}: {reason}")]
    Write { channel: String, reason: String },

    #[error("channel {channel} given a degenerate range [{min}, {max}]")]
    DegenerateRange { channel: String, min: f64, max: f64 },

    #[error("{count} servos configured, driver supports at most {max}")]
    TooManyServos { count: usize, max: usize },

    #[error("driver used before init")]
    NotInitialized,
}

/// Hardware actuation abstraction
///
/// Implementations must not block for long: `set_many` runs inside the vehicle tick.
pub trait CommandDriver: Send {
    /// Open the bus, register every configured channel and centre it
    fn init(&mut self) -> Result<(), DriverError>;

    /// Write one command; unknown channel names are ignored
    fn set(&mut self, command: &DriverCommand) -> Result<(), DriverError>;

    /// Write commands in order, stopping at the first failure (earlier writes stay applied)
    fn set_many(&mut self, commands: &[DriverCommand]) -> Result<(), DriverError> {
        for command in commands {
            self.set(command)?;
        }
        Ok(())
    }

    /// Release the bus
    fn stop(&mut self) -> Result<(), DriverError>;
}

impl<D: CommandDriver + ?Sized> CommandDriver for Box<D> {
    fn init(&mut self) -> Result<(), DriverError> {
        (**self).init()
    }

    fn set(&mut self, command: &DriverCommand) -> Result<(), DriverError> {
        (**self).set(command)
    }

    fn set_many(&mut self, commands: &[DriverCommand]) -> Result<(), DriverError> {
        (**self).set_many(commands)
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        (**self).stop()
    }
}
