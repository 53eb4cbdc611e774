// Named servo channels and the command -> pulse width mapping

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::info;

use super::{DriverCommand, DriverError};
use crate::config::ServoConfig;
use crate::mapping::map_to_range;

/// A configured output channel
#[derive(Debug, Clone, PartialEq)]
pub struct ServoChannel {
    pub config: ServoConfig,
}

impl ServoChannel {
    pub fn new(config: ServoConfig) -> Self {
        Self { config }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Midpoint of the physical pulse range (µs)
    pub fn center_pulse(&self) -> f64 {
        (self.config.min_pulse_us + self.config.max_pulse_us) / 2.0
    }

    /// Output fraction in [0, 1] for a command, after offset trim and inversion
    pub fn fraction_for(&self, command: &DriverCommand) -> Result<f64, DriverError> {
        // Also rejects NaN bounds
        if command.min.partial_cmp(&command.max) != Some(Ordering::Less) {
            return Err(DriverError::DegenerateRange {
                channel: command.name.clone(),
                min: command.min,
                max: command.max,
            });
        }

        let value = command.value.max(command.min).min(command.max);
        let offset = f64::from(self.config.mid_offset) / 100.0;
        let fraction = map_to_range(value + offset, command.min, command.max, 0.0, 1.0);

        if self.config.inverted {
            Ok(1.0 - fraction)
        } else {
            Ok(fraction)
        }
    }

    /// Pulse width (µs) for a command
    pub fn pulse_for(&self, command: &DriverCommand) -> Result<f64, DriverError> {
        let fraction = self.fraction_for(command)?;
        Ok(self.config.min_pulse_us + fraction * (self.config.max_pulse_us - self.config.min_pulse_us))
    }
}

/// All channels a driver knows about, keyed by name
#[derive(Debug, Clone, Default)]
pub struct ServoBank {
    channels: HashMap<String, ServoChannel>,
}

impl ServoBank {
    /// Build from config, rejecting more servos than the hardware supports
    pub fn new(configs: &[ServoConfig], max_servos: usize) -> Result<Self, DriverError> {
        if configs.len() > max_servos {
            return Err(DriverError::TooManyServos {
                count: configs.len(),
                max: max_servos,
            });
        }

        let mut channels = HashMap::with_capacity(configs.len());
        for config in configs {
            info!("Servo added: {} (channel {})", config.name, config.channel);
            channels.insert(config.name.clone(), ServoChannel::new(config.clone()));
        }
        Ok(Self { channels })
    }

    pub fn get(&self, name: &str) -> Option<&ServoChannel> {
        self.channels.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServoChannel> {
        self.channels.values()
    }
}
