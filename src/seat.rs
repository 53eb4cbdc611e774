// Seats: one operator's command stream and telemetry, plus the watchdog
//
// Seat / SeatHandle are the two ends of a seat's bounded queues (core side and
// transport side). VehicleSeat wraps the core side for the vehicle:
// - ingestion task: keeps only the newest command, flags the seat stale after
//   SAFETY_WINDOW of silence
// - tick side: turns the newest command into a proposed vehicle state, or
//   centres the seat's axes when the operator is not active
//
// Activity: Idle (never heard from) -> Active -> Stale -> Active ...

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::{COMMAND_QUEUE_CAPACITY, HUD_QUEUE_CAPACITY, LATENCY_THRESHOLD_MS, SAFETY_WINDOW};
use crate::diagnostics::NetDevStats;
use crate::messages::{ControlState, Hud};
use crate::shutdown::Shutdown;
use crate::vehicle::{SeatLogic, VehicleError, VehicleState};

/// Core side of a seat's queues
#[derive(Debug)]
pub struct Seat {
    pub index: usize,
    pub commands: mpsc::Receiver<ControlState>,
    pub hud: mpsc::Sender<Hud>,
}

/// Transport side of a seat's queues
#[derive(Debug)]
pub struct SeatHandle {
    pub index: usize,
    pub commands: mpsc::Sender<ControlState>,
    pub hud: mpsc::Receiver<Hud>,
}

/// Create the bounded command and HUD queues for seat `index`
pub fn seat_channel(index: usize) -> (Seat, SeatHandle) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let (hud_tx, hud_rx) = mpsc::channel(HUD_QUEUE_CAPACITY);
    (
        Seat {
            index,
            commands: command_rx,
            hud: hud_tx,
        },
        SeatHandle {
            index,
            commands: command_tx,
            hud: hud_rx,
        },
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatActivity {
    /// No command received yet
    Idle,
    /// Command accepted within the safety window
    Active,
    /// Silent for longer than the safety window
    Stale,
}

#[derive(Debug)]
struct SeatBook {
    activity: SeatActivity,
    latest: Option<ControlState>,
    applied: Option<ControlState>,
    accepted_at: Option<Instant>,
}

impl SeatBook {
    /// Mark stale if the last acceptance is older than the safety window
    fn expire(&mut self, index: usize, now: Instant) {
        if self.activity != SeatActivity::Active {
            return;
        }
        let silent_for = self
            .accepted_at
            .map(|at| now.saturating_duration_since(at));
        if silent_for.is_none_or(|silence| silence > SAFETY_WINDOW) {
            warn!(
                "Seat {} stale: no command for {:?}, centering",
                index, silent_for
            );
            self.activity = SeatActivity::Stale;
        }
    }
}

/// One seat as seen by the vehicle
pub struct VehicleSeat<S: VehicleState> {
    index: usize,
    logic: S::Seat,
    hud: mpsc::Sender<Hud>,
    book: Mutex<SeatBook>,
}

impl<S: VehicleState> VehicleSeat<S> {
    pub fn new(index: usize, logic: S::Seat, hud: mpsc::Sender<Hud>) -> Self {
        Self {
            index,
            logic,
            hud,
            book: Mutex::new(SeatBook {
                activity: SeatActivity::Idle,
                latest: None,
                applied: None,
                accepted_at: None,
            }),
        }
    }

    pub fn role(&self) -> &'static str {
        self.logic.role()
    }

    /// Per-seat hardware setup hook, nothing to do yet
    pub fn init(&self) {
        debug!("Seat {} ({}) ready", self.index, self.role());
    }

    pub async fn activity(&self) -> SeatActivity {
        self.book.lock().await.activity
    }

    /// Newest accepted command
    pub async fn latest(&self) -> Option<ControlState> {
        self.book.lock().await.latest.clone()
    }

    /// Keep `command` if it is not older than the one held; returns whether it was kept
    pub async fn accept(&self, command: ControlState, now: Instant) -> bool {
        let mut book = self.book.lock().await;
        if book
            .latest
            .as_ref()
            .is_some_and(|latest| command.timestamp < latest.timestamp)
        {
            trace!(
                "Seat {} dropping out of order command ({})",
                self.index, command.timestamp
            );
            return false;
        }

        if book.activity != SeatActivity::Active {
            info!("Seat {} ({}) active", self.index, self.role());
        }
        book.latest = Some(command);
        book.accepted_at = Some(now);
        book.activity = SeatActivity::Active;
        true
    }

    pub async fn check_watchdog(&self, now: Instant) -> SeatActivity {
        let mut book = self.book.lock().await;
        book.expire(self.index, now);
        book.activity
    }

    /// Consume commands until shutdown
    ///
    /// Returns `SeatClosed` if the transport side drops the queue.
    pub async fn ingest(
        self: std::sync::Arc<Self>,
        mut commands: mpsc::Receiver<ControlState>,
        mut shutdown: Shutdown,
    ) -> Result<(), VehicleError> {
        let mut watchdog = time::interval(SAFETY_WINDOW);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Seat {} ({}) listening for commands", self.index, self.role());

        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!("Seat {} stopping", self.index);
                    return Ok(());
                }
                received = commands.recv() => match received {
                    Some(command) => {
                        self.accept(command, Instant::now()).await;
                    }
                    None => {
                        warn!("Seat {} command queue closed", self.index);
                        return Err(VehicleError::SeatClosed { seat: self.index });
                    }
                },
                _ = watchdog.tick() => {
                    self.check_watchdog(Instant::now()).await;
                }
            }
        }
    }

    /// This seat's proposal for the next vehicle state
    pub async fn apply_command(&self, state: &S, now: Instant) -> S {
        let mut book = self.book.lock().await;
        book.expire(self.index, now);

        let latest = match (book.activity, book.latest.clone()) {
            (SeatActivity::Active, Some(latest)) => latest,
            _ => return self.logic.center(state),
        };

        let Some(previous) = book.applied.replace(latest.clone()) else {
            debug!("Seat {} first command, waiting for the next one", self.index);
            return state.clone();
        };

        let gap = latest.timestamp.saturating_sub(previous.timestamp);
        if gap > LATENCY_THRESHOLD_MS {
            debug!(
                "Seat {} skipping command: {}ms since the last one",
                self.index, gap
            );
            return state.clone();
        }

        match self.logic.parse(&previous, &latest, state) {
            Ok(next) => next,
            Err(e) => {
                warn!("Seat {} failed interpreting command: {}", self.index, e);
                state.clone()
            }
        }
    }

    /// Queue a HUD for an active seat; dropped if the queue is full
    pub async fn update_hud(&self, state: &S, stats: &NetDevStats) {
        if self.activity().await != SeatActivity::Active {
            return;
        }
        match self.hud.try_send(self.logic.hud(state, stats)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Seat {} HUD queue full, dropping", self.index),
            Err(TrySendError::Closed(_)) => trace!("Seat {} HUD queue closed", self.index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::driver::DriverCommand;
    use crate::shutdown::shutdown_channel;
    use crate::vehicle::ParseError;

    // Minimal vehicle: axis 0 copied into `value`, centering zeroes it
    #[derive(Debug, Clone, PartialEq, Default)]
    struct Gauge {
        value: f64,
    }

    // Parse calls, counted per seat instance
    #[derive(Debug, Clone, Default)]
    struct GaugeSeat {
        parses: Arc<AtomicUsize>,
    }

    impl SeatLogic<Gauge> for GaugeSeat {
        fn role(&self) -> &'static str {
            "gauge"
        }

        fn parse(
            &self,
            _previous: &ControlState,
            latest: &ControlState,
            _state: &Gauge,
        ) -> Result<Gauge, ParseError> {
            self.parses.fetch_add(1, Ordering::SeqCst);
            Ok(Gauge {
                value: crate::vehicle::axis(latest, 0)?,
            })
        }

        fn center(&self, _state: &Gauge) -> Gauge {
            Gauge::default()
        }

        fn hud(&self, state: &Gauge, _stats: &NetDevStats) -> Hud {
            Hud::new(vec![format!("Value:{:.2}", state.value)])
        }
    }

    impl VehicleState for Gauge {
        type Seat = GaugeSeat;
        const NAME: &'static str = "gauge";

        fn seat_logic(_index: usize) -> Option<GaugeSeat> {
            Some(GaugeSeat::default())
        }

        fn driver_commands(&self) -> Vec<DriverCommand> {
            vec![DriverCommand::new("value", self.value, -1.0, 1.0)]
        }

        fn neutral(&self) -> Self {
            Gauge::default()
        }
    }

    fn seat() -> (VehicleSeat<Gauge>, SeatHandle) {
        seat_with(GaugeSeat::default())
    }

    fn seat_with(logic: GaugeSeat) -> (VehicleSeat<Gauge>, SeatHandle) {
        let (seat, handle) = seat_channel(0);
        (VehicleSeat::new(seat.index, logic, seat.hud), handle)
    }

    fn command(value: f64, timestamp: i64) -> ControlState {
        ControlState::new(vec![value], 0, timestamp)
    }

    #[tokio::test]
    async fn test_out_of_order_commands_dropped() {
        let (seat, _handle) = seat();
        let now = Instant::now();
        assert!(seat.accept(command(0.5, 5), now).await);
        assert!(!seat.accept(command(0.3, 3), now).await);
        assert!(seat.accept(command(0.1, 10), now).await);
        // Equal timestamps are accepted
        assert!(seat.accept(command(0.2, 10), now).await);
        assert_eq!(seat.latest().await.unwrap().axes, vec![0.2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ingest_keeps_newest() {
        let (seat, handle) = seat_channel(0);
        let seat_runtime = Arc::new(VehicleSeat::<Gauge>::new(0, GaugeSeat::default(), seat.hud));
        let (trigger, shutdown) = shutdown_channel();
        let task = tokio::spawn(Arc::clone(&seat_runtime).ingest(seat.commands, shutdown));

        for timestamp in [5, 3, 10] {
            handle.commands.send(command(0.0, timestamp)).await.unwrap();
        }
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(seat_runtime.latest().await.unwrap().timestamp, 10);

        trigger.trigger();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ingest_reports_closed_queue() {
        let (seat, handle) = seat_channel(3);
        let seat_runtime = Arc::new(VehicleSeat::<Gauge>::new(3, GaugeSeat::default(), seat.hud));
        let (_trigger, shutdown) = shutdown_channel();
        let task = tokio::spawn(seat_runtime.ingest(seat.commands, shutdown));

        drop(handle);
        assert!(matches!(
            task.await.unwrap(),
            Err(VehicleError::SeatClosed { seat: 3 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_marks_silent_seat_stale() {
        let (seat, handle) = seat_channel(0);
        let seat_runtime = Arc::new(VehicleSeat::<Gauge>::new(0, GaugeSeat::default(), seat.hud));
        let (trigger, shutdown) = shutdown_channel();
        let task = tokio::spawn(Arc::clone(&seat_runtime).ingest(seat.commands, shutdown));

        assert_eq!(seat_runtime.activity().await, SeatActivity::Idle);
        handle.commands.send(command(0.4, 1)).await.unwrap();
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seat_runtime.activity().await, SeatActivity::Active);

        // No disconnect, just silence
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(seat_runtime.activity().await, SeatActivity::Stale);

        handle.commands.send(command(0.4, 600)).await.unwrap();
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(seat_runtime.activity().await, SeatActivity::Active);

        trigger.trigger();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_idle_seat_centres() {
        let (seat, _handle) = seat();
        let state = Gauge { value: 0.7 };
        assert_eq!(seat.apply_command(&state, Instant::now()).await, Gauge::default());
    }

    #[tokio::test]
    async fn test_first_command_is_only_a_baseline() {
        let (seat, _handle) = seat();
        let now = Instant::now();
        let state = Gauge { value: 0.7 };

        seat.accept(command(0.2, 100), now).await;
        assert_eq!(seat.apply_command(&state, now).await, state);

        seat.accept(command(0.3, 133), now).await;
        assert_eq!(seat.apply_command(&state, now).await, Gauge { value: 0.3 });
    }

    #[tokio::test]
    async fn test_large_timestamp_gap_skips_one_tick() {
        let (seat, _handle) = seat();
        let now = Instant::now();
        let state = Gauge { value: 0.7 };

        seat.accept(command(0.2, 0), now).await;
        seat.apply_command(&state, now).await;
        seat.accept(command(0.2, 100), now).await;
        assert_eq!(seat.apply_command(&state, now).await, Gauge { value: 0.2 });

        // 550ms jump: skipped, but becomes the new baseline
        seat.accept(command(0.9, 650), now).await;
        assert_eq!(seat.apply_command(&state, now).await, state);

        seat.accept(command(0.5, 683), now).await;
        assert_eq!(seat.apply_command(&state, now).await, Gauge { value: 0.5 });
    }

    #[tokio::test]
    async fn test_tick_detects_silence_before_watchdog() {
        let (seat, _handle) = seat();
        let now = Instant::now();
        let state = Gauge { value: 0.7 };

        seat.accept(command(0.2, 0), now).await;
        seat.apply_command(&state, now).await;
        let later = now + SAFETY_WINDOW + Duration::from_millis(1);
        assert_eq!(seat.apply_command(&state, later).await, Gauge::default());
        assert_eq!(seat.activity().await, SeatActivity::Stale);
    }

    #[tokio::test]
    async fn test_centering_is_idempotent() {
        let logic = GaugeSeat::default();
        let once = logic.center(&Gauge { value: 0.4 });
        assert_eq!(logic.center(&once), once);
    }

    #[tokio::test]
    async fn test_parse_error_keeps_state() {
        let logic = GaugeSeat::default();
        let parses = Arc::clone(&logic.parses);
        let (seat, _handle) = seat_with(logic);
        let now = Instant::now();
        let state = Gauge { value: 0.7 };

        seat.accept(ControlState::new(vec![], 0, 0), now).await;
        seat.apply_command(&state, now).await;
        // The baseline is never parsed
        assert_eq!(parses.load(Ordering::SeqCst), 0);

        seat.accept(ControlState::new(vec![], 0, 33), now).await;
        assert_eq!(seat.apply_command(&state, now).await, state);
        assert_eq!(parses.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hud_only_while_active() {
        let (seat, mut handle) = seat();
        let stats = NetDevStats::default();
        let state = Gauge { value: 0.25 };

        seat.update_hud(&state, &stats).await;
        assert!(handle.hud.try_recv().is_err());

        seat.accept(command(0.0, 0), Instant::now()).await;
        seat.update_hud(&state, &stats).await;
        assert_eq!(handle.hud.try_recv().unwrap().lines, vec!["Value:0.25"]);
    }

    #[tokio::test]
    async fn test_full_hud_queue_drops_without_blocking() {
        let (seat, mut handle) = seat();
        let stats = NetDevStats::default();
        seat.accept(command(0.0, 0), Instant::now()).await;

        for _ in 0..HUD_QUEUE_CAPACITY + 10 {
            seat.update_hud(&Gauge::default(), &stats).await;
        }
        let mut received = 0;
        while handle.hud.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, HUD_QUEUE_CAPACITY);
    }
}
