// SmallRacer: on-road car with a switchable sequential / H-pattern gearbox
// and a shaped steering response

use std::fmt;
use std::sync::Arc;

use super::gears::{GearTable, NEUTRAL, REVERSE};
use super::{ParseError, SeatLogic, VehicleState, axis};
use crate::config::{ConfigError, SmallRacerConfig};
use crate::diagnostics::NetDevStats;
use crate::driver::DriverCommand;
use crate::mapping::{map_axis_with_deadzone, pow_curve};
use crate::messages::{ButtonFlags, ControlState, Hud, new_press};

const DEADZONE: f64 = 0.01;
const TRIM_STEP: f64 = 0.01;

const INPUT_MIN: f64 = -1.0;
const INPUT_MAX: f64 = 1.0;
const OUTPUT_MIN: f64 = -1.0;
const OUTPUT_MAX: f64 = 1.0;

// Buttons
const TRIM_LEFT: usize = 0;
const TRIM_RIGHT: usize = 1;
const UPSHIFT: usize = 3;
const DOWNSHIFT: usize = 4;
const SWITCH_TRANSMISSION: usize = 5;
const H_PATTERN_REVERSE: usize = 6;
// First..sixth gear positions of the shifter
const H_PATTERN_GEARS: [usize; 6] = [7, 8, 9, 10, 11, 12];

// Axes
const AXIS_STEER: usize = 0;
const AXIS_THROTTLE: usize = 1;
const AXIS_BRAKE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transmission {
    /// Up/down shift buttons
    #[default]
    Sequential,
    /// Gear follows whichever shifter position is held
    HPattern,
}

impl Transmission {
    pub fn toggled(self) -> Self {
        match self {
            Transmission::Sequential => Transmission::HPattern,
            Transmission::HPattern => Transmission::Sequential,
        }
    }
}

impl fmt::Display for Transmission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transmission::Sequential => write!(f, "sequential"),
            Transmission::HPattern => write!(f, "hpattern"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmallRacerState {
    pub esc: f64,
    pub steer: f64,
    pub steer_trim: f64,
    pub gear: i32,
    pub transmission: Transmission,

    gears: Arc<GearTable>,
    steer_curve: f64,
}

impl SmallRacerState {
    pub fn new(config: &SmallRacerConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            esc: 0.0,
            steer: 0.0,
            steer_trim: 0.0,
            gear: NEUTRAL,
            transmission: Transmission::default(),
            gears: Arc::new(GearTable::new(&config.gears)?),
            steer_curve: config.steer_curve,
        })
    }

    fn trim_steer(&mut self, delta: f64) {
        self.steer_trim = (self.steer_trim + delta).clamp(INPUT_MIN, INPUT_MAX);
    }

    /// Gear from the held shifter position; nothing held is neutral
    fn map_h_pattern(&mut self, held: &ButtonFlags) -> Result<(), ParseError> {
        for (i, button) in H_PATTERN_GEARS.iter().enumerate() {
            if held.is_pressed(*button)? {
                self.gear = (i as i32 + 1).min(self.gears.top_gear());
                return Ok(());
            }
        }
        self.gear = if held.is_pressed(H_PATTERN_REVERSE)? {
            REVERSE
        } else {
            NEUTRAL
        };
        Ok(())
    }

    fn map_steer(&mut self, value: f64) {
        let shaped = pow_curve(value + self.steer_trim, self.steer_curve);
        self.steer = map_axis_with_deadzone(
            shaped, INPUT_MIN, INPUT_MAX, OUTPUT_MIN, OUTPUT_MAX, DEADZONE, 0.0,
        );
    }

    fn map_esc(&mut self, throttle: f64, brake: f64) {
        self.esc = self.gears.map_throttle(throttle, brake, self.gear, DEADZONE);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmallRacerSeat {
    Driver,
    /// Rides along: sees the HUD, controls nothing
    Passenger,
}

impl SmallRacerSeat {
    fn parse_driver(
        previous: &ControlState,
        latest: &ControlState,
        state: &SmallRacerState,
    ) -> Result<SmallRacerState, ParseError> {
        let (old, new) = (previous.buttons(), latest.buttons());
        let mut next = state.clone();

        if new_press(&old, &new, SWITCH_TRANSMISSION)? {
            next.transmission = next.transmission.toggled();
        }
        if new_press(&old, &new, TRIM_LEFT)? {
            next.trim_steer(-TRIM_STEP);
        }
        if new_press(&old, &new, TRIM_RIGHT)? {
            next.trim_steer(TRIM_STEP);
        }

        match next.transmission {
            Transmission::Sequential => {
                if new_press(&old, &new, UPSHIFT)? {
                    next.gear = next.gears.upshift(next.gear);
                }
                if new_press(&old, &new, DOWNSHIFT)? {
                    next.gear = next.gears.downshift(next.gear);
                }
            }
            Transmission::HPattern => next.map_h_pattern(&new)?,
        }

        next.map_steer(axis(latest, AXIS_STEER)?);
        next.map_esc(axis(latest, AXIS_THROTTLE)?, axis(latest, AXIS_BRAKE)?);
        Ok(next)
    }
}

impl SeatLogic<SmallRacerState> for SmallRacerSeat {
    fn role(&self) -> &'static str {
        match self {
            SmallRacerSeat::Driver => "driver",
            SmallRacerSeat::Passenger => "passenger",
        }
    }

    fn parse(
        &self,
        previous: &ControlState,
        latest: &ControlState,
        state: &SmallRacerState,
    ) -> Result<SmallRacerState, ParseError> {
        match self {
            SmallRacerSeat::Driver => Self::parse_driver(previous, latest, state),
            SmallRacerSeat::Passenger => Ok(state.clone()),
        }
    }

    fn center(&self, state: &SmallRacerState) -> SmallRacerState {
        let mut next = state.clone();
        if *self == SmallRacerSeat::Driver {
            next.gear = NEUTRAL;
            next.esc = 0.0;
            next.steer = 0.0;
        }
        next
    }

    fn hud(&self, state: &SmallRacerState, stats: &NetDevStats) -> Hud {
        let status = match self {
            SmallRacerSeat::Driver => format!(
                "Esc:{:.2} | Gear:{} | Type:{} | Steer:{:.2} | Trim:{:.2}",
                state.esc,
                state.gears.name(state.gear),
                state.transmission,
                state.steer,
                state.steer_trim,
            ),
            SmallRacerSeat::Passenger => format!(
                "Esc:{:.2} | Gear:{} | Steer:{:.2} | Trim:{:.2}",
                state.esc,
                state.gears.name(state.gear),
                state.steer,
                state.steer_trim,
            ),
        };
        Hud::new(vec![stats.hud_line(), status])
    }
}

impl VehicleState for SmallRacerState {
    type Seat = SmallRacerSeat;
    const NAME: &'static str = "small racer";

    fn seat_logic(index: usize) -> Option<SmallRacerSeat> {
        match index {
            0 => Some(SmallRacerSeat::Driver),
            1 => Some(SmallRacerSeat::Passenger),
            _ => None,
        }
    }

    fn driver_commands(&self) -> Vec<DriverCommand> {
        vec![
            DriverCommand::new("esc", self.esc, OUTPUT_MIN, OUTPUT_MAX),
            DriverCommand::new("steer", self.steer, OUTPUT_MIN, OUTPUT_MAX),
        ]
    }

    fn neutral(&self) -> Self {
        SmallRacerSeat::Driver.center(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RatioBounds;

    const EPS: f64 = 1e-9;
    const REST: [f64; 3] = [0.0, -1.0, -1.0];

    fn state() -> SmallRacerState {
        SmallRacerState::new(&SmallRacerConfig::default()).unwrap()
    }

    fn command(axes: [f64; 3], buttons: u32, timestamp: i64) -> ControlState {
        let mut all = vec![0.0; 10];
        all[..3].copy_from_slice(&axes);
        ControlState::new(all, buttons, timestamp)
    }

    fn drive(state: &SmallRacerState, frames: &[(u32, [f64; 3])]) -> SmallRacerState {
        let mut previous = command(REST, 0, 0);
        let mut state = state.clone();
        for (i, (buttons, axes)) in frames.iter().enumerate() {
            let latest = command(*axes, *buttons, (i as i64 + 1) * 33);
            state = SmallRacerSeat::Driver.parse(&previous, &latest, &state).unwrap();
            previous = latest;
        }
        state
    }

    fn hold(buttons: &[usize]) -> u32 {
        buttons.iter().fold(0, |bits, b| bits | 1 << b)
    }

    #[test]
    fn test_sequential_shifting() {
        let up = hold(&[UPSHIFT]);
        let next = drive(&state(), &[(up, REST), (0, REST), (up, REST)]);
        assert_eq!(next.gear, 2);
        assert_eq!(next.transmission, Transmission::Sequential);
    }

    #[test]
    fn test_toggle_transmission_on_press() {
        let toggle = hold(&[SWITCH_TRANSMISSION]);
        let next = drive(&state(), &[(toggle, REST), (toggle, REST)]);
        assert_eq!(next.transmission, Transmission::HPattern);
        let next = drive(&next, &[(toggle, REST)]);
        assert_eq!(next.transmission, Transmission::Sequential);
    }

    #[test]
    fn test_h_pattern_follows_held_position() {
        let mut h = state();
        h.transmission = Transmission::HPattern;

        let third = hold(&[9]);
        let next = drive(&h, &[(third, REST), (third, REST)]);
        assert_eq!(next.gear, 3);

        let next = drive(&h, &[(hold(&[H_PATTERN_REVERSE]), REST)]);
        assert_eq!(next.gear, REVERSE);

        // Released shifter is neutral, and sequential buttons do nothing
        let next = drive(&next, &[(hold(&[UPSHIFT]), REST)]);
        assert_eq!(next.gear, NEUTRAL);

        // Lowest held gear wins
        let next = drive(&h, &[(hold(&[H_PATTERN_REVERSE, 12, 8]), REST)]);
        assert_eq!(next.gear, 2);
    }

    #[test]
    fn test_h_pattern_capped_at_top_gear() {
        let mut config = SmallRacerConfig::default();
        config.gears.forward.truncate(4);
        let mut h = SmallRacerState::new(&config).unwrap();
        h.transmission = Transmission::HPattern;

        let next = drive(&h, &[(hold(&[12]), REST)]);
        assert_eq!(next.gear, 4);
    }

    #[test]
    fn test_steer_curve_softens_centre() {
        let mut config = SmallRacerConfig::default();
        config.steer_curve = 2.0;
        let curved = SmallRacerState::new(&config).unwrap();

        let linear = drive(&state(), &[(0, [0.5, -1.0, -1.0])]);
        let soft = drive(&curved, &[(0, [0.5, -1.0, -1.0])]);
        assert!(soft.steer < linear.steer);
        assert!(soft.steer > 0.0);

        let left = drive(&curved, &[(0, [-0.5, -1.0, -1.0])]);
        assert!((left.steer + soft.steer).abs() < EPS);

        let full = drive(&curved, &[(0, [1.0, -1.0, -1.0])]);
        assert!((full.steer - 1.0).abs() < EPS);
    }

    #[test]
    fn test_throttle_respects_gear() {
        let mut config = SmallRacerConfig::default();
        config.gears.forward[0] = RatioBounds::new(-0.15, 0.15);
        let racer = SmallRacerState::new(&config).unwrap();

        let next = drive(&racer, &[(hold(&[UPSHIFT]), [0.0, 1.0, -1.0])]);
        assert_eq!(next.gear, 1);
        assert!((next.esc - 0.15).abs() < EPS);

        let neutral = drive(&racer, &[(0, [0.0, 1.0, -1.0])]);
        assert_eq!(neutral.esc, 0.0);
    }

    #[test]
    fn test_passenger_is_an_observer() {
        let mut s = state();
        s.gear = 2;
        s.esc = 0.3;
        let previous = command(REST, 0, 0);
        let latest = command([1.0, 1.0, -1.0], hold(&[UPSHIFT]), 33);
        assert_eq!(SmallRacerSeat::Passenger.parse(&previous, &latest, &s).unwrap(), s);
        assert_eq!(SmallRacerSeat::Passenger.center(&s), s);
    }

    #[test]
    fn test_driver_centering_is_idempotent() {
        let mut s = state();
        s.gear = 4;
        s.esc = 0.5;
        s.steer = 0.7;
        let centred = SmallRacerSeat::Driver.center(&s);
        assert_eq!((centred.gear, centred.esc, centred.steer), (NEUTRAL, 0.0, 0.0));
        assert_eq!(SmallRacerSeat::Driver.center(&centred), centred);
    }

    #[test]
    fn test_hud_and_commands() {
        let mut s = state();
        s.gear = 1;
        s.steer = -0.5;
        let hud = SmallRacerSeat::Driver.hud(&s, &NetDevStats::default());
        assert_eq!(
            hud.lines[1],
            "Esc:0.00 | Gear:1 | Type:sequential | Steer:-0.50 | Trim:0.00"
        );
        let hud = SmallRacerSeat::Passenger.hud(&s, &NetDevStats::default());
        assert_eq!(hud.lines[1], "Esc:0.00 | Gear:1 | Steer:-0.50 | Trim:0.00");

        let commands = s.driver_commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].name, "esc");
        assert_eq!(commands[1].value, -0.5);
    }
}
