// Gear ratio table and gear-bounded throttle/brake mapping

use std::collections::BTreeMap;

use crate::config::{ConfigError, GearRatios};
use crate::mapping::{map_to_range, map_trigger_with_deadzone};

pub const REVERSE: i32 = -1;
pub const NEUTRAL: i32 = 0;

// Trigger axes rest at -1 and travel to +1
const AXIS_MIN: f64 = -1.0;
const AXIS_MAX: f64 = 1.0;

/// Output bounds of one gear
#[derive(Debug, Clone, PartialEq)]
pub struct Ratio {
    pub name: String,
    /// Max forward output
    pub max: f64,
    /// Min reverse (braking) output
    pub min: f64,
}

impl Ratio {
    fn new(name: impl Into<String>, max: f64, min: f64) -> Self {
        Self {
            name: name.into(),
            max,
            min,
        }
    }
}

/// Gear index -> ratio; -1 = "R", 0 = "N", 1..=top named by number
#[derive(Debug, Clone, PartialEq)]
pub struct GearTable {
    ratios: BTreeMap<i32, Ratio>,
}

impl GearTable {
    pub fn new(config: &GearRatios) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut ratios = BTreeMap::new();
        ratios.insert(REVERSE, Ratio::new("R", 0.0, config.reverse.min));
        ratios.insert(NEUTRAL, Ratio::new("N", 0.0, 0.0));
        for (i, bounds) in config.forward.iter().enumerate() {
            let gear = i as i32 + 1;
            ratios.insert(gear, Ratio::new(gear.to_string(), bounds.max, bounds.min));
        }
        Ok(Self { ratios })
    }

    pub fn get(&self, gear: i32) -> Option<&Ratio> {
        self.ratios.get(&gear)
    }

    pub fn top_gear(&self) -> i32 {
        self.ratios.keys().next_back().copied().unwrap_or(NEUTRAL)
    }

    /// Display name, "?" for gears outside the table
    pub fn name(&self, gear: i32) -> &str {
        self.get(gear).map_or("?", |ratio| ratio.name.as_str())
    }

    pub fn upshift(&self, gear: i32) -> i32 {
        (gear + 1).min(self.top_gear())
    }

    pub fn downshift(&self, gear: i32) -> i32 {
        (gear - 1).max(REVERSE)
    }

    /// Combine throttle and brake triggers into one ESC output bounded by `gear`
    ///
    /// Whichever trigger is pressed further wins. Neutral (and any gear outside the
    /// table) is always zero; reverse never produces forward output.
    pub fn map_throttle(&self, throttle: f64, brake: f64, gear: i32, deadzone: f64) -> f64 {
        if gear == NEUTRAL {
            return 0.0;
        }
        let Some(ratio) = self.get(gear) else {
            return 0.0;
        };

        let throttle = map_trigger_with_deadzone(
            throttle, AXIS_MIN, AXIS_MAX, AXIS_MIN, AXIS_MAX, deadzone, AXIS_MIN,
        );
        let brake = map_trigger_with_deadzone(
            brake, AXIS_MIN, AXIS_MAX, AXIS_MIN, AXIS_MAX, deadzone, AXIS_MIN,
        );

        if throttle > brake {
            if gear == REVERSE {
                0.0
            } else {
                map_to_range(throttle, AXIS_MIN, AXIS_MAX, 0.0, ratio.max)
            }
        } else if brake > throttle {
            map_to_range(-brake, AXIS_MIN, AXIS_MAX, ratio.min, 0.0)
        } else {
            0.0
        }
    }
}
