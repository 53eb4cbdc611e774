// Crawler: rock crawler with a camera gimbal and a passenger turret
//
// Driver seat: gears, trimmed steering, throttle/brake triggers and an
// integrating pan/tilt camera. Passenger seat: turret trigger and integrating
// turret pan/tilt.

use std::sync::Arc;

use super::gears::{GearTable, NEUTRAL};
use super::{ParseError, SeatLogic, VehicleState, axis};
use crate::config::{ConfigError, CrawlerConfig};
use crate::diagnostics::NetDevStats;
use crate::driver::DriverCommand;
use crate::mapping::{map_axis_with_deadzone, map_trigger_with_deadzone};
use crate::messages::{ControlState, Hud, new_press};

const DEADZONE: f64 = 0.05;
const TRIM_STEP: f64 = 0.01;

const INPUT_MIN: f64 = -1.0;
const INPUT_MAX: f64 = 1.0;
const OUTPUT_MIN: f64 = -1.0;
const OUTPUT_MAX: f64 = 1.0;

/// Trigger output at rest
///
/// Released sits at the end-stop, so the trigger servo parks at its minimum pulse.
pub const TRIGGER_RELEASED: f64 = OUTPUT_MIN;

// Buttons
const TRIM_LEFT: usize = 0;
const TRIM_RIGHT: usize = 1;
const CAM_CENTER: usize = 2;
const TURRET_CENTER: usize = 2;
const UPSHIFT: usize = 3;
const DOWNSHIFT: usize = 4;

// Axes
const AXIS_STEER: usize = 0;
const AXIS_THROTTLE: usize = 1;
const AXIS_BRAKE: usize = 2;
const AXIS_PAN: usize = 3;
const AXIS_TILT: usize = 4;
const AXIS_TRIGGER: usize = 1;
const AXIS_TURRET_PAN: usize = 3;
const AXIS_TURRET_TILT: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct CrawlerState {
    pub esc: f64,
    pub steer: f64,
    pub steer_trim: f64,
    pub pan: f64,
    pub tilt: f64,
    pub gear: i32,

    pub trigger: f64,
    pub turret_pan: f64,
    pub turret_tilt: f64,

    gears: Arc<GearTable>,
    pan_speed: f64,
    tilt_speed: f64,
}

impl CrawlerState {
    pub fn new(config: &CrawlerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            esc: 0.0,
            steer: 0.0,
            steer_trim: 0.0,
            pan: 0.0,
            tilt: 0.0,
            gear: NEUTRAL,
            trigger: TRIGGER_RELEASED,
            turret_pan: 0.0,
            turret_tilt: 0.0,
            gears: Arc::new(GearTable::new(&config.gears)?),
            pan_speed: config.pan_speed,
            tilt_speed: config.tilt_speed,
        })
    }

    fn trim_steer(&mut self, delta: f64) {
        self.steer_trim = (self.steer_trim + delta).clamp(INPUT_MIN, INPUT_MAX);
    }

    fn map_steer(&mut self, value: f64) {
        self.steer = map_axis_with_deadzone(
            value + self.steer_trim,
            INPUT_MIN,
            INPUT_MAX,
            OUTPUT_MIN,
            OUTPUT_MAX,
            DEADZONE,
            0.0,
        );
    }

    fn map_esc(&mut self, throttle: f64, brake: f64) {
        self.esc = self.gears.map_throttle(throttle, brake, self.gear, DEADZONE);
    }

    fn map_trigger(&mut self, value: f64) {
        self.trigger = map_trigger_with_deadzone(
            value,
            INPUT_MIN,
            INPUT_MAX,
            OUTPUT_MIN,
            OUTPUT_MAX,
            DEADZONE,
            TRIGGER_RELEASED,
        );
    }
}

/// Move `position` by the stick's per-tick delta, staying within the output range
fn integrate(position: f64, stick: f64, speed: f64) -> f64 {
    let delta = map_axis_with_deadzone(stick, INPUT_MIN, INPUT_MAX, -speed, speed, DEADZONE, 0.0);
    (position + delta).clamp(OUTPUT_MIN, OUTPUT_MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlerSeat {
    Driver,
    Passenger,
}

impl CrawlerSeat {
    fn parse_driver(
        previous: &ControlState,
        latest: &ControlState,
        state: &CrawlerState,
    ) -> Result<CrawlerState, ParseError> {
        let (old, new) = (previous.buttons(), latest.buttons());
        let mut next = state.clone();

        if new_press(&old, &new, UPSHIFT)? {
            next.gear = next.gears.upshift(next.gear);
        }
        if new_press(&old, &new, DOWNSHIFT)? {
            next.gear = next.gears.downshift(next.gear);
        }
        if new_press(&old, &new, TRIM_LEFT)? {
            next.trim_steer(-TRIM_STEP);
        }
        if new_press(&old, &new, TRIM_RIGHT)? {
            next.trim_steer(TRIM_STEP);
        }
        if new_press(&old, &new, CAM_CENTER)? {
            next.pan = 0.0;
            next.tilt = 0.0;
        }

        next.map_steer(axis(latest, AXIS_STEER)?);
        next.map_esc(axis(latest, AXIS_THROTTLE)?, axis(latest, AXIS_BRAKE)?);
        next.pan = integrate(next.pan, axis(latest, AXIS_PAN)?, next.pan_speed);
        next.tilt = integrate(next.tilt, axis(latest, AXIS_TILT)?, next.tilt_speed);
        Ok(next)
    }

    fn parse_passenger(
        previous: &ControlState,
        latest: &ControlState,
        state: &CrawlerState,
    ) -> Result<CrawlerState, ParseError> {
        let mut next = state.clone();

        if new_press(&previous.buttons(), &latest.buttons(), TURRET_CENTER)? {
            next.turret_pan = 0.0;
            next.turret_tilt = 0.0;
        }

        next.map_trigger(axis(latest, AXIS_TRIGGER)?);
        next.turret_pan = integrate(next.turret_pan, axis(latest, AXIS_TURRET_PAN)?, next.pan_speed);
        next.turret_tilt = integrate(
            next.turret_tilt,
            axis(latest, AXIS_TURRET_TILT)?,
            next.tilt_speed,
        );
        Ok(next)
    }
}

impl SeatLogic<CrawlerState> for CrawlerSeat {
    fn role(&self) -> &'static str {
        match self {
            CrawlerSeat::Driver => "driver",
            CrawlerSeat::Passenger => "passenger",
        }
    }

    fn parse(
        &self,
        previous: &ControlState,
        latest: &ControlState,
        state: &CrawlerState,
    ) -> Result<CrawlerState, ParseError> {
        match self {
            CrawlerSeat::Driver => Self::parse_driver(previous, latest, state),
            CrawlerSeat::Passenger => Self::parse_passenger(previous, latest, state),
        }
    }

    fn center(&self, state: &CrawlerState) -> CrawlerState {
        let mut next = state.clone();
        match self {
            CrawlerSeat::Driver => {
                next.gear = NEUTRAL;
                next.esc = 0.0;
                next.steer = 0.0;
                next.pan = 0.0;
                next.tilt = 0.0;
            }
            CrawlerSeat::Passenger => {
                next.trigger = TRIGGER_RELEASED;
                next.turret_pan = 0.0;
                next.turret_tilt = 0.0;
            }
        }
        next
    }

    fn hud(&self, state: &CrawlerState, stats: &NetDevStats) -> Hud {
        let status = match self {
            CrawlerSeat::Driver => format!(
                "Esc:{:.2} | Gear:{} | Steer:{:.2} | Trim:{:.2} | Pan:{:.2} | Tilt:{:.2}",
                state.esc,
                state.gears.name(state.gear),
                state.steer,
                state.steer_trim,
                state.pan,
                state.tilt,
            ),
            CrawlerSeat::Passenger => format!(
                "Trigger:{:.2} | TurretPan:{:.2} | TurretTilt:{:.2}",
                state.trigger, state.turret_pan, state.turret_tilt,
            ),
        };
        Hud::new(vec![stats.hud_line(), status])
    }
}

impl VehicleState for CrawlerState {
    type Seat = CrawlerSeat;
    const NAME: &'static str = "crawler";

    fn seat_logic(index: usize) -> Option<CrawlerSeat> {
        match index {
            0 => Some(CrawlerSeat::Driver),
            1 => Some(CrawlerSeat::Passenger),
            _ => None,
        }
    }

    fn driver_commands(&self) -> Vec<DriverCommand> {
        [
            ("esc", self.esc),
            ("steer", self.steer),
            ("pan", self.pan),
            ("tilt", self.tilt),
            ("trigger", self.trigger),
            ("turret_pan", self.turret_pan),
            ("turret_tilt", self.turret_tilt),
        ]
        .into_iter()
        .map(|(name, value)| DriverCommand::new(name, value, OUTPUT_MIN, OUTPUT_MAX))
        .collect()
    }

    fn neutral(&self) -> Self {
        CrawlerSeat::Passenger.center(&CrawlerSeat::Driver.center(self))
    }
}
