// Timing constants, queue sizes and the runtime configuration (servos, gears, seats)

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// Vehicle tick period (~30 Hz)
pub const TICK_PERIOD: Duration = Duration::from_millis(33);

// Seat watchdog: max silence before a seat is forced to centre
pub const SAFETY_WINDOW: Duration = Duration::from_millis(200);

// Max gap between two client timestamps before a command is not interpreted
pub const LATENCY_THRESHOLD_MS: i64 = 200;

// Per-seat queue sizes
pub const COMMAND_QUEUE_CAPACITY: usize = 100;
pub const HUD_QUEUE_CAPACITY: usize = 100;

// Number of axes a client sends in each ControlState
pub const AXIS_COUNT: usize = 10;

// Servo defaults
pub const MAX_SUPPORTED_SERVOS: usize = 16;
pub const DEFAULT_MIN_PULSE_US: f64 = 750.0;
pub const DEFAULT_MAX_PULSE_US: f64 = 2250.0;

// PCA9685 defaults
pub const DEFAULT_I2C_BUS: u8 = 1;
pub const DEFAULT_I2C_ADDRESS: u8 = 0x40;

// Prefix for every environment variable read by `Config::from_env`
pub const ENV_PREFIX: &str = "RC_";

/// Errors raised while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed reading config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed parsing config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid gear {gear}: {reason}")]
    InvalidGear { gear: i32, reason: String },

    #[error("invalid servo {name}: {reason}")]
    InvalidServo { name: String, reason: String },
}

/// Which command driver backs the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriverKind {
    #[default]
    Sim,
    Pca9685,
    PiPwm,
}

impl FromStr for DriverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sim" => Ok(Self::Sim),
            "pca9685" => Ok(Self::Pca9685),
            "pi-pwm" | "pi_pwm" | "pipwm" => Ok(Self::PiPwm),
            other => Err(format!("unknown command driver '{}'", other)),
        }
    }
}

/// One named servo/ESC output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServoConfig {
    pub name: String,
    pub channel: u8,
    pub min_pulse_us: f64,
    pub max_pulse_us: f64,
    pub inverted: bool,
    /// Midpoint trim in percent of the command range (100 = one full unit)
    pub mid_offset: i32,
}

impl ServoConfig {
    pub fn new(name: impl Into<String>, channel: u8) -> Self {
        Self {
            name: name.into(),
            channel,
            min_pulse_us: DEFAULT_MIN_PULSE_US,
            max_pulse_us: DEFAULT_MAX_PULSE_US,
            inverted: false,
            mid_offset: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_pulse_us >= self.max_pulse_us {
            return Err(ConfigError::InvalidServo {
                name: self.name.clone(),
                reason: format!(
                    "min pulse {} must be below max pulse {}",
                    self.min_pulse_us, self.max_pulse_us
                ),
            });
        }
        if self.channel as usize >= MAX_SUPPORTED_SERVOS {
            return Err(ConfigError::InvalidServo {
                name: self.name.clone(),
                reason: format!("channel {} out of range", self.channel),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub driver: DriverKind,
    pub i2c_bus: u8,
    pub address: u8,
    pub servos: Vec<ServoConfig>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::Sim,
            i2c_bus: DEFAULT_I2C_BUS,
            address: DEFAULT_I2C_ADDRESS,
            servos: Vec::new(),
        }
    }
}

/// Output bounds of one gear
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioBounds {
    pub min: f64,
    pub max: f64,
}

impl RatioBounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Reverse + forward gear bounds; neutral is implicit and always zero
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GearRatios {
    pub reverse: RatioBounds,
    pub forward: Vec<RatioBounds>,
}

impl GearRatios {
    /// Forward gears must straddle zero and reverse may only go backwards
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.forward.is_empty() {
            return Err(ConfigError::InvalidGear {
                gear: 1,
                reason: "at least one forward gear is required".to_string(),
            });
        }
        if self.reverse.min > 0.0 {
            return Err(ConfigError::InvalidGear {
                gear: -1,
                reason: format!("reverse min {} must not be positive", self.reverse.min),
            });
        }
        for (i, bounds) in self.forward.iter().enumerate() {
            if bounds.min > 0.0 || bounds.max < 0.0 {
                return Err(ConfigError::InvalidGear {
                    gear: i as i32 + 1,
                    reason: format!("bounds [{}, {}] must contain zero", bounds.min, bounds.max),
                });
            }
        }
        Ok(())
    }
}

impl Default for GearRatios {
    fn default() -> Self {
        Self {
            reverse: RatioBounds::new(-0.40, 0.0),
            forward: vec![
                RatioBounds::new(-0.10, 0.10),
                RatioBounds::new(-0.20, 0.20),
                RatioBounds::new(-0.40, 0.40),
                RatioBounds::new(-0.60, 0.60),
                RatioBounds::new(-0.80, 0.80),
                RatioBounds::new(-1.00, 1.00),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub gears: GearRatios,
    /// Max pan change per tick at full stick
    pub pan_speed: f64,
    /// Max tilt change per tick at full stick
    pub tilt_speed: f64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            gears: GearRatios::default(),
            pan_speed: 0.05,
            tilt_speed: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmallRacerConfig {
    pub gears: GearRatios,
    /// Steering response exponent, 1.0 = linear, valid up to 2.0
    pub steer_curve: f64,
}

impl Default for SmallRacerConfig {
    fn default() -> Self {
        Self {
            gears: GearRatios::default(),
            steer_curve: 1.0,
        }
    }
}

/// Full runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub seat_count: usize,
    pub command: CommandConfig,
    pub crawler: CrawlerConfig,
    pub small_racer: SmallRacerConfig,
    /// Network interface reported in the HUD
    pub net_interface: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seat_count: 1,
            command: CommandConfig::default(),
            crawler: CrawlerConfig::default(),
            small_racer: SmallRacerConfig::default(),
            net_interface: "wlan0".to_string(),
        }
    }
}

impl Config {
    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let cfg: Config = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from `RC_*` environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let cfg = Self::from_lookup(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build a config from any key lookup (keys include the `RC_` prefix)
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };
        let defaults = Config::default();

        let mut servos = Vec::with_capacity(MAX_SUPPORTED_SERVOS);
        for i in 0..MAX_SUPPORTED_SERVOS {
            let prefix = format!("SERVO{}_", i);
            let name = env.string(&format!("{}NAME", prefix), "");
            if name.is_empty() {
                continue;
            }
            info!("Found config for servo: {}", name);
            servos.push(ServoConfig {
                name,
                channel: env.parsed(&format!("{}CHANNEL", prefix), i as u8),
                min_pulse_us: env.parsed(&format!("{}MINPULSE", prefix), DEFAULT_MIN_PULSE_US),
                max_pulse_us: env.parsed(&format!("{}MAXPULSE", prefix), DEFAULT_MAX_PULSE_US),
                inverted: env.parsed(&format!("{}INVERTED", prefix), false),
                mid_offset: env.parsed(&format!("{}MIDOFFSET", prefix), 0),
            });
        }

        Config {
            seat_count: env.parsed("SEAT_COUNT", defaults.seat_count),
            command: CommandConfig {
                driver: env.parsed("COMMAND_DRIVER", defaults.command.driver),
                i2c_bus: env.parsed("I2C_BUS", defaults.command.i2c_bus),
                address: env.parsed("I2C_ADDRESS", defaults.command.address),
                servos,
            },
            crawler: CrawlerConfig {
                gears: env.gears("CRAWLER_", &defaults.crawler.gears),
                pan_speed: env.parsed("CRAWLER_PAN_SPEED", defaults.crawler.pan_speed),
                tilt_speed: env.parsed("CRAWLER_TILT_SPEED", defaults.crawler.tilt_speed),
            },
            small_racer: SmallRacerConfig {
                gears: env.gears("SMALLRACER_", &defaults.small_racer.gears),
                steer_curve: env.parsed("SMALLRACER_STEER_CURVE", defaults.small_racer.steer_curve),
            },
            net_interface: env.string("NET_INTERFACE", &defaults.net_interface),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for servo in &self.command.servos {
            servo.validate()?;
        }
        self.crawler.gears.validate()?;
        self.small_racer.gears.validate()?;
        Ok(())
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(&format!("{}{}", ENV_PREFIX, key)).map(|v| v.trim_matches(['\r', '\n', ' ']).to_string())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(key) {
            None => default,
            Some(value) => match value.parse::<T>() {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("{}{} not parsed, using default: {}", ENV_PREFIX, key, e);
                    default
                }
            },
        }
    }

    fn gears(&self, prefix: &str, defaults: &GearRatios) -> GearRatios {
        let reverse = RatioBounds::new(
            self.parsed(&format!("{}GEARR_MIN", prefix), defaults.reverse.min),
            self.parsed(&format!("{}GEARR_MAX", prefix), defaults.reverse.max),
        );
        let forward = defaults
            .forward
            .iter()
            .enumerate()
            .map(|(i, bounds)| {
                let gear = i + 1;
                RatioBounds::new(
                    self.parsed(&format!("{}GEAR{}_MIN", prefix, gear), bounds.min),
                    self.parsed(&format!("{}GEAR{}_MAX", prefix, gear), bounds.max),
                )
            })
            .collect();
        GearRatios { reverse, forward }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn map_lookup(vars: &HashMap<String, String>) -> impl Fn(&str) -> Option<String> + '_ {
        move |key| vars.get(key).cloned()
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_without_env() {
        let env = HashMap::new();
        let cfg = Config::from_lookup(map_lookup(&env));
        assert_eq!(cfg, Config::default());
        assert!(cfg.command.servos.is_empty());
        assert_eq!(cfg.crawler.gears.forward.len(), 6);
    }

    #[test]
    fn test_servos_read_from_env() {
        let env = vars(&[
            ("RC_SERVO0_NAME", "esc"),
            ("RC_SERVO1_NAME", "steer"),
            ("RC_SERVO1_CHANNEL", "4"),
            ("RC_SERVO1_INVERTED", "true"),
            ("RC_SERVO1_MIDOFFSET", "-5"),
            ("RC_SERVO1_MINPULSE", "1000\r"),
        ]);
        let cfg = Config::from_lookup(map_lookup(&env));

        assert_eq!(cfg.command.servos.len(), 2);
        let esc = &cfg.command.servos[0];
        assert_eq!(esc.name, "esc");
        assert_eq!(esc.channel, 0);
        assert_eq!(esc.min_pulse_us, DEFAULT_MIN_PULSE_US);

        let steer = &cfg.command.servos[1];
        assert_eq!(steer.channel, 4);
        assert!(steer.inverted);
        assert_eq!(steer.mid_offset, -5);
        assert_eq!(steer.min_pulse_us, 1000.0);
    }

    #[test]
    fn test_unnamed_servo_slots_are_skipped() {
        let env = vars(&[("RC_SERVO3_NAME", "pan"), ("RC_SERVO2_CHANNEL", "9")]);
        let cfg = Config::from_lookup(map_lookup(&env));
        assert_eq!(cfg.command.servos.len(), 1);
        assert_eq!(cfg.command.servos[0].channel, 3);
    }

    #[test]
    fn test_bad_value_falls_back_to_default() {
        let env = vars(&[("RC_SEAT_COUNT", "two"), ("RC_CRAWLER_PAN_SPEED", "0.1")]);
        let cfg = Config::from_lookup(map_lookup(&env));
        assert_eq!(cfg.seat_count, 1);
        assert_eq!(cfg.crawler.pan_speed, 0.1);
    }

    #[test]
    fn test_gear_overrides() {
        let env = vars(&[
            ("RC_SMALLRACER_GEAR2_MAX", "0.3"),
            ("RC_SMALLRACER_GEARR_MIN", "-0.5"),
        ]);
        let cfg = Config::from_lookup(map_lookup(&env));
        assert_eq!(cfg.small_racer.gears.forward[1].max, 0.3);
        assert_eq!(cfg.small_racer.gears.reverse.min, -0.5);
        // Crawler untouched
        assert_eq!(cfg.crawler.gears.forward[1].max, 0.2);
    }

    #[test]
    fn test_driver_kind_parse() {
        assert_eq!("PCA9685".parse::<DriverKind>(), Ok(DriverKind::Pca9685));
        assert_eq!("pi-pwm".parse::<DriverKind>(), Ok(DriverKind::PiPwm));
        assert!("serial".parse::<DriverKind>().is_err());
    }

    #[test]
    fn test_invalid_servo_rejected() {
        let mut cfg = Config::default();
        let mut servo = ServoConfig::new("steer", 1);
        servo.min_pulse_us = 2000.0;
        servo.max_pulse_us = 1000.0;
        cfg.command.servos.push(servo);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidServo { .. })
        ));
    }

    #[test]
    fn test_invalid_gears_rejected() {
        let mut cfg = Config::default();
        cfg.crawler.gears.forward[2] = RatioBounds::new(0.1, 0.4);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidGear { gear: 3, .. })
        ));

        let mut cfg = Config::default();
        cfg.small_racer.gears.forward.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"seat_count": 2, "crawler": {"pan_speed": 0.2}}"#).unwrap();
        assert_eq!(cfg.seat_count, 2);
        assert_eq!(cfg.crawler.pan_speed, 0.2);
        assert_eq!(cfg.crawler.tilt_speed, 0.05);
        assert_eq!(cfg.net_interface, "wlan0");
    }
}
