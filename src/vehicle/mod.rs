// Vehicle orchestrator: fixed 33 ms tick over N seats
//
// Each tick: every seat proposes a next state (or a centred one if its operator
// went quiet), proposals are merged into the canonical state, the canonical state
// is written to hardware and each seat gets a fresh HUD.
//
// Vehicle types plug in through two traits:
// - VehicleState: the state record, its actuator commands and merge policy
// - SeatLogic: per-seat parse / center / hud behaviour (a closed enum per vehicle)

pub mod crawler;
pub mod gears;
pub mod small_racer;

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::TICK_PERIOD;
use crate::diagnostics::{DiagnosticsSource, NetDevStats, NoDiagnostics};
use crate::driver::{CommandDriver, DriverCommand, DriverError};
use crate::messages::{ButtonError, ControlState, Hud};
use crate::seat::{Seat, VehicleSeat};
use crate::shutdown::Shutdown;

pub use crawler::{CrawlerSeat, CrawlerState};
pub use gears::{GearTable, Ratio};
pub use small_racer::{SmallRacerSeat, SmallRacerState, Transmission};

/// A command could not be interpreted; the seat keeps its previous state
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Button(#[from] ButtonError),

    #[error("axis {index} missing, command carries {len} axes")]
    MissingAxis { index: usize, len: usize },
}

/// Errors that end a vehicle's run loop
#[derive(Debug, thiserror::Error)]
pub enum VehicleError {
    #[error("failed initializing command driver: {0}")]
    DriverInit(#[source] DriverError),

    #[error("failed writing vehicle state: {0}")]
    DriverWrite(#[source] DriverError),

    #[error("failed stopping command driver: {0}")]
    DriverStop(#[source] DriverError),

    #[error("seat {seat} command queue closed")]
    SeatClosed { seat: usize },

    #[error("seat task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

/// Axis value by index, as a parse error when the client sent too few axes
pub fn axis(command: &ControlState, index: usize) -> Result<f64, ParseError> {
    command.axis(index).ok_or(ParseError::MissingAxis {
        index,
        len: command.axes.len(),
    })
}

/// Per-seat interpretation of operator commands for one vehicle type
pub trait SeatLogic<S>: Send + Sync + 'static {
    /// Human readable role ("driver", "passenger")
    fn role(&self) -> &'static str;

    /// Edge-triggered buttons from `previous` -> `latest` plus axis remapping
    fn parse(&self, previous: &ControlState, latest: &ControlState, state: &S)
    -> Result<S, ParseError>;

    /// Force the axes this seat owns to their safe position
    fn center(&self, state: &S) -> S;

    fn hud(&self, state: &S, stats: &NetDevStats) -> Hud;
}

/// Canonical state of one vehicle type
pub trait VehicleState: Clone + Send + Sync + 'static {
    type Seat: SeatLogic<Self>;

    /// Name used in logs
    const NAME: &'static str;

    /// Seat logic for a seat index, `None` if the vehicle has no such seat
    fn seat_logic(index: usize) -> Option<Self::Seat>;

    /// One command per actuator, every tick
    fn driver_commands(&self) -> Vec<DriverCommand>;

    /// This state with every axis at rest (configuration kept)
    fn neutral(&self) -> Self;

    /// Combine the seats' proposals (in seat order) into the next canonical state
    ///
    /// The driver seat's proposal wins wholesale; a vehicle with mixed axis
    /// ownership overrides this.
    fn merge(&self, proposals: Vec<Self>) -> Self {
        match proposals.into_iter().next() {
            Some(driver) => driver,
            None => {
                debug!("No seat proposals, using neutral state");
                self.neutral()
            }
        }
    }
}

pub struct Vehicle<S: VehicleState, D: CommandDriver> {
    state: Arc<RwLock<S>>,
    seats: Vec<Arc<VehicleSeat<S>>>,
    // Inbound queues, handed to the ingestion tasks by `run`
    pending: Vec<(Arc<VehicleSeat<S>>, tokio::sync::mpsc::Receiver<ControlState>)>,
    driver: D,
    diagnostics: Box<dyn DiagnosticsSource>,
    diagnostics_failing: bool,
}

impl<S: VehicleState, D: CommandDriver> Vehicle<S, D> {
    pub fn new(initial: S, seats: Vec<Seat>, driver: D) -> Self {
        info!("Setting up {} with {} seat(s)", S::NAME, seats.len());

        let mut vehicle_seats = Vec::with_capacity(seats.len());
        let mut pending = Vec::with_capacity(seats.len());
        for seat in seats {
            let Some(logic) = S::seat_logic(seat.index) else {
                warn!("{} has no seat {}, ignoring it", S::NAME, seat.index);
                continue;
            };
            info!("Setting up {} seat {}", logic.role(), seat.index);
            let vehicle_seat = Arc::new(VehicleSeat::new(seat.index, logic, seat.hud));
            pending.push((Arc::clone(&vehicle_seat), seat.commands));
            vehicle_seats.push(vehicle_seat);
        }

        Self {
            state: Arc::new(RwLock::new(initial)),
            seats: vehicle_seats,
            pending,
            driver,
            diagnostics: Box::new(NoDiagnostics),
            diagnostics_failing: false,
        }
    }

    /// Use `source` for the HUD network counters
    pub fn with_diagnostics(mut self, source: Box<dyn DiagnosticsSource>) -> Self {
        self.diagnostics = source;
        self
    }

    /// Shared read access to the canonical state
    pub fn state_handle(&self) -> Arc<RwLock<S>> {
        Arc::clone(&self.state)
    }

    pub fn seats(&self) -> &[Arc<VehicleSeat<S>>] {
        &self.seats
    }

    /// Initialize hardware and drive it to the neutral state
    ///
    /// On failure the driver is stopped before the error is returned.
    pub async fn init(&mut self) -> Result<(), VehicleError> {
        info!("Initializing {}", S::NAME);
        let result = self.start_hardware().await;
        if let Err(e) = &result {
            error!("Failed initializing {}: {}", S::NAME, e);
            if let Err(stop_err) = self.stop() {
                warn!("Also failed stopping after error: {}", stop_err);
            }
        }
        result
    }

    async fn start_hardware(&mut self) -> Result<(), VehicleError> {
        self.driver.init().map_err(VehicleError::DriverInit)?;

        for seat in &self.seats {
            seat.init();
        }

        let mut state = self.state.write().await;
        *state = state.neutral();
        self.driver
            .set_many(&state.driver_commands())
            .map_err(VehicleError::DriverWrite)?;
        Ok(())
    }

    /// Run one merge-and-actuate cycle with `now` as the seats' clock
    pub async fn tick(&mut self, now: Instant) -> Result<(), VehicleError> {
        let mut state = self.state.write().await;
        let mut proposals = Vec::with_capacity(self.seats.len());
        for seat in &self.seats {
            proposals.push(seat.apply_command(&state, now).await);
        }
        *state = state.merge(proposals);
        let snapshot = state.clone();
        drop(state);

        self.driver
            .set_many(&snapshot.driver_commands())
            .map_err(VehicleError::DriverWrite)?;

        let stats = self.host_stats();
        for seat in &self.seats {
            seat.update_hud(&snapshot, &stats).await;
        }
        Ok(())
    }

    /// Ingest every seat and tick until shutdown or the first fatal error
    ///
    /// The driver is always stopped on the way out. When the loop failed, that
    /// error is returned even if stopping fails too.
    pub async fn run(&mut self, shutdown: Shutdown) -> Result<(), VehicleError> {
        info!("Starting {}", S::NAME);
        let result = self.drive(shutdown).await;
        let stopped = self.stop();

        match (result, stopped) {
            (Err(e), Err(stop_err)) => {
                warn!("Also failed stopping after error: {}", stop_err);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), stopped) => stopped,
        }
    }

    async fn drive(&mut self, mut shutdown: Shutdown) -> Result<(), VehicleError> {
        let mut tasks = JoinSet::new();
        for (seat, commands) in self.pending.drain(..) {
            tasks.spawn(seat.ingest(commands, shutdown.clone()));
        }

        let mut ticker = time::interval(TICK_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "{} running: {}ms tick, {} seat(s)",
            S::NAME,
            TICK_PERIOD.as_millis(),
            self.seats.len()
        );

        let outcome = loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!("Stopping {} state syncer", S::NAME);
                    break Ok(());
                }
                Some(joined) = tasks.join_next() => match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => break Err(e),
                    Err(e) => break Err(VehicleError::TaskFailed(e)),
                },
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(Instant::now()).await {
                        error!("Failed applying {} state: {}", S::NAME, e);
                        break Err(e);
                    }
                }
            }
        };

        tasks.shutdown().await;
        outcome
    }

    /// Release the hardware
    pub fn stop(&mut self) -> Result<(), VehicleError> {
        info!("Stopping {}", S::NAME);
        self.driver.stop().map_err(VehicleError::DriverStop)
    }

    // Diagnostics never fail the tick: zeros are reported instead, warning once
    fn host_stats(&mut self) -> NetDevStats {
        match self.diagnostics.snapshot() {
            Ok(stats) => {
                if self.diagnostics_failing {
                    info!("Host diagnostics recovered");
                    self.diagnostics_failing = false;
                }
                stats
            }
            Err(e) => {
                if !self.diagnostics_failing {
                    warn!("Host diagnostics unavailable, reporting zeros: {}", e);
                    self.diagnostics_failing = true;
                }
                NetDevStats::default()
            }
        }
    }
}
