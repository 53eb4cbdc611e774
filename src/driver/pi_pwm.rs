// CommandDriver using the Raspberry Pi's two hardware PWM channels
// (PWM0 on GPIO12, PWM1 on GPIO13). Servos beyond the second are rejected.

use std::collections::HashMap;
use std::time::Duration;

use rppal::pwm::{Channel, Polarity, Pwm};
use tracing::{info, trace, warn};

use super::{CommandDriver, DriverCommand, DriverError, ServoBank};
use crate::config::ServoConfig;

const PERIOD: Duration = Duration::from_millis(20);
const PWM_CHANNELS: [Channel; 2] = [Channel::Pwm0, Channel::Pwm1];

pub struct PiPwmDriver {
    servo_configs: Vec<ServoConfig>,
    servos: Option<ServoBank>,
    outputs: HashMap<String, Pwm>,
}

impl PiPwmDriver {
    pub fn new(servo_configs: Vec<ServoConfig>) -> Self {
        Self {
            servo_configs,
            servos: None,
            outputs: HashMap::new(),
        }
    }
}

fn pulse_width(pulse_us: f64) -> Duration {
    Duration::from_micros(pulse_us.round().max(0.0) as u64)
}

impl CommandDriver for PiPwmDriver {
    fn init(&mut self) -> Result<(), DriverError> {
        let servos = ServoBank::new(&self.servo_configs, PWM_CHANNELS.len())?;

        info!("Centering all servos");
        // Servos are assigned to PWM0/PWM1 in config order
        for (config, channel) in self.servo_configs.iter().zip(PWM_CHANNELS) {
            let Some(servo) = servos.get(&config.name) else {
                continue;
            };
            let pwm = Pwm::with_period(
                channel,
                PERIOD,
                pulse_width(servo.center_pulse()),
                Polarity::Normal,
                true,
            )
            .map_err(|e| DriverError::Bus(e.to_string()))?;
            self.outputs.insert(config.name.clone(), pwm);
        }

        self.servos = Some(servos);
        Ok(())
    }

    fn set(&mut self, command: &DriverCommand) -> Result<(), DriverError> {
        let servos = self.servos.as_ref().ok_or(DriverError::NotInitialized)?;
        let (Some(servo), Some(pwm)) = (servos.get(&command.name), self.outputs.get(&command.name)) else {
            return Ok(());
        };
        let pulse = servo.pulse_for(command)?;
        trace!("{} -> {:.1}us", command.name, pulse);
        pwm.set_pulse_width(pulse_width(pulse))
            .map_err(|e| DriverError::Write {
                channel: command.name.clone(),
                reason: e.to_string(),
            })
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        let mut first_error = None;
        for (name, pwm) in self.outputs.drain() {
            if let Err(e) = pwm.disable() {
                warn!("Failed disabling PWM for {}: {}", name, e);
                first_error.get_or_insert(DriverError::Bus(e.to_string()));
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
