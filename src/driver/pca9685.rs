// CommandDriver for the Adafruit PCA9685 16 channel servo board (I2C)
//
// The board runs at 50 Hz; each servo pulse width is converted into the
// 12-bit off-count of its channel.

use std::fmt::Debug;

use embedded_hal::blocking::i2c::{Write, WriteRead};
use pwm_pca9685::{Address, Channel, Pca9685};
use rppal::i2c::I2c;
use tracing::{info, trace};

use super::{CommandDriver, DriverCommand, DriverError, ServoBank};
use crate::config::{MAX_SUPPORTED_SERVOS, ServoConfig};

const OSCILLATOR_HZ: f64 = 25_000_000.0;
const PWM_FREQUENCY_HZ: f64 = 50.0;
const PERIOD_US: f64 = 1_000_000.0 / PWM_FREQUENCY_HZ;
const COUNTS: f64 = 4096.0;

pub struct Pca9685Driver {
    bus: u8,
    address: u8,
    servo_configs: Vec<ServoConfig>,
    servos: Option<ServoBank>,
    pwm: Option<Pca9685<I2c>>,
}

impl Pca9685Driver {
    pub fn new(bus: u8, address: u8, servo_configs: Vec<ServoConfig>) -> Self {
        Self {
            bus,
            address,
            servo_configs,
            servos: None,
            pwm: None,
        }
    }
}

/// Prescale register value for the output frequency (121 at 50 Hz)
fn prescale() -> u8 {
    ((OSCILLATOR_HZ / (COUNTS * PWM_FREQUENCY_HZ)).round() - 1.0) as u8
}

fn pulse_to_counts(pulse_us: f64) -> u16 {
    (pulse_us / PERIOD_US * COUNTS).round().clamp(0.0, COUNTS - 1.0) as u16
}

fn board_channel(channel: u8) -> Option<Channel> {
    let channel = match channel {
        0 => Channel::C0,
        1 => Channel::C1,
        2 => Channel::C2,
        3 => Channel::C3,
        4 => Channel::C4,
        5 => Channel::C5,
        6 => Channel::C6,
        7 => Channel::C7,
        8 => Channel::C8,
        9 => Channel::C9,
        10 => Channel::C10,
        11 => Channel::C11,
        12 => Channel::C12,
        13 => Channel::C13,
        14 => Channel::C14,
        15 => Channel::C15,
        _ => return None,
    };
    Some(channel)
}

fn write_pulse<I2C, E>(
    pwm: &mut Pca9685<I2C>,
    name: &str,
    channel: u8,
    pulse_us: f64,
) -> Result<(), DriverError>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    E: Debug,
{
    let board = board_channel(channel).ok_or_else(|| DriverError::Write {
        channel: name.to_string(),
        reason: format!("channel {} not on board", channel),
    })?;
    let counts = pulse_to_counts(pulse_us);
    trace!("{} (C{}) -> {:.1}us / {} counts", name, channel, pulse_us, counts);
    pwm.set_channel_on_off(board, 0, counts)
        .map_err(|e| DriverError::Write {
            channel: name.to_string(),
            reason: format!("{:?}", e),
        })
}

impl CommandDriver for Pca9685Driver {
    fn init(&mut self) -> Result<(), DriverError> {
        info!(
            "Opening PCA9685 on i2c-{} address 0x{:02X}",
            self.bus, self.address
        );
        let servos = ServoBank::new(&self.servo_configs, MAX_SUPPORTED_SERVOS)?;

        let i2c = I2c::with_bus(self.bus).map_err(|e| DriverError::Bus(e.to_string()))?;
        let mut pwm = Pca9685::new(i2c, Address::from(self.address))
            .map_err(|e| DriverError::Bus(format!("{:?}", e)))?;
        pwm.set_prescale(prescale())
            .map_err(|e| DriverError::Bus(format!("{:?}", e)))?;
        pwm.enable()
            .map_err(|e| DriverError::Bus(format!("{:?}", e)))?;

        info!("Centering all servos");
        for servo in servos.iter() {
            write_pulse(&mut pwm, servo.name(), servo.config.channel, servo.center_pulse())?;
        }

        self.pwm = Some(pwm);
        self.servos = Some(servos);
        Ok(())
    }

    fn set(&mut self, command: &DriverCommand) -> Result<(), DriverError> {
        let (Some(servos), Some(pwm)) = (self.servos.as_ref(), self.pwm.as_mut()) else {
            return Err(DriverError::NotInitialized);
        };
        let Some(servo) = servos.get(&command.name) else {
            return Ok(());
        };
        let pulse = servo.pulse_for(command)?;
        write_pulse(pwm, servo.name(), servo.config.channel, pulse)
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        if let Some(mut pwm) = self.pwm.take() {
            info!("Disabling PCA9685 outputs");
            pwm.disable()
                .map_err(|e| DriverError::Bus(format!("{:?}", e)))?;
        }
        Ok(())
    }
}
