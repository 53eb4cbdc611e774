// In-memory command driver
//
// Used when no hardware is attached (bench runs, CI) and by the tests.
// Everything written is kept in a shared SimRecord so callers can inspect it
// after the driver has been moved into a vehicle.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, trace};

use super::{CommandDriver, DriverCommand, DriverError, ServoBank};
use crate::config::{MAX_SUPPORTED_SERVOS, ServoConfig};

/// What the simulated hardware has seen
#[derive(Debug, Clone, Default)]
pub struct SimRecord {
    pub initialized: bool,
    pub stopped: bool,
    /// Successful channel writes (centering included)
    pub writes: usize,
    /// Last pulse width (µs) per channel
    pub pulses: BTreeMap<String, f64>,
    /// Last command value per channel
    pub values: BTreeMap<String, f64>,
}

pub struct SimDriver {
    servo_configs: Vec<ServoConfig>,
    servos: Option<ServoBank>,
    record: Arc<Mutex<SimRecord>>,
    fail_after: Option<usize>,
    fail_stop: bool,
}

impl SimDriver {
    pub fn new(servo_configs: Vec<ServoConfig>) -> Self {
        Self {
            servo_configs,
            servos: None,
            record: Arc::new(Mutex::new(SimRecord::default())),
            fail_after: None,
            fail_stop: false,
        }
    }

    /// Channels with default pulse ranges on consecutive channel numbers
    pub fn with_channels(names: &[&str]) -> Self {
        let configs = names
            .iter()
            .enumerate()
            .map(|(i, name)| ServoConfig::new(*name, i as u8))
            .collect();
        Self::new(configs)
    }

    /// Fail every write once `writes` writes have succeeded
    pub fn fail_after(mut self, writes: usize) -> Self {
        self.fail_after = Some(writes);
        self
    }

    /// Make `stop` return an error
    pub fn fail_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// Shared view of the recorded outputs
    pub fn record(&self) -> Arc<Mutex<SimRecord>> {
        Arc::clone(&self.record)
    }

    fn lock_record(&self) -> MutexGuard<'_, SimRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CommandDriver for SimDriver {
    fn init(&mut self) -> Result<(), DriverError> {
        let servos = ServoBank::new(&self.servo_configs, MAX_SUPPORTED_SERVOS)?;

        info!("Centering all servos");
        let mut record = self.lock_record();
        for servo in servos.iter() {
            record.pulses.insert(servo.name().to_string(), servo.center_pulse());
            record.writes += 1;
        }
        record.initialized = true;
        drop(record);

        self.servos = Some(servos);
        Ok(())
    }

    fn set(&mut self, command: &DriverCommand) -> Result<(), DriverError> {
        let servos = self.servos.as_ref().ok_or(DriverError::NotInitialized)?;
        let Some(servo) = servos.get(&command.name) else {
            trace!("Ignoring unknown channel {}", command.name);
            return Ok(());
        };
        let pulse = servo.pulse_for(command)?;

        let mut record = self.lock_record();
        if let Some(limit) = self.fail_after {
            if record.writes >= limit {
                return Err(DriverError::Write {
                    channel: command.name.clone(),
                    reason: "simulated bus fault".to_string(),
                });
            }
        }
        record.writes += 1;
        record.pulses.insert(command.name.clone(), pulse);
        record.values.insert(command.name.clone(), command.value);
        trace!("{} -> {:.1}us", command.name, pulse);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        let mut record = self.lock_record();
        record.stopped = true;
        debug!("Simulated bus released");
        if self.fail_stop {
            return Err(DriverError::Bus("simulated release failure".to_string()));
        }
        Ok(())
    }
}
