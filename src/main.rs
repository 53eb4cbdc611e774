use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rc_vehicle_runtime::bridge::{self, DEFAULT_PREFIX};
use rc_vehicle_runtime::config::{CommandConfig, Config, DriverKind};
use rc_vehicle_runtime::diagnostics::ProcNetDev;
use rc_vehicle_runtime::driver::{CommandDriver, SimDriver};
use rc_vehicle_runtime::seat::seat_channel;
use rc_vehicle_runtime::shutdown::{Shutdown, shutdown_channel};
use rc_vehicle_runtime::vehicle::{
    CrawlerState, SmallRacerState, Vehicle, VehicleError, VehicleState,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VehicleKind {
    Crawler,
    SmallRacer,
}

/// Onboard control runtime for a remotely driven vehicle
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Vehicle type to drive
    #[arg(long, value_enum, default_value_t = VehicleKind::Crawler)]
    vehicle: VehicleKind,

    /// JSON config file (RC_* environment variables are used otherwise)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Command driver: sim, pca9685 or pi-pwm
    #[arg(long)]
    driver: Option<DriverKind>,

    /// Number of operator seats
    #[arg(long)]
    seats: Option<usize>,

    /// Network interface reported on the HUD
    #[arg(long)]
    interface: Option<String>,

    /// Zenoh key prefix for seat topics
    #[arg(long, default_value = DEFAULT_PREFIX)]
    prefix: String,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=debug for more)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), BoxError> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            Config::from_file(path)?
        }
        None => Config::from_env()?,
    };
    if let Some(driver) = args.driver {
        config.command.driver = driver;
    }
    if let Some(seats) = args.seats {
        config.seat_count = seats;
    }
    if let Some(interface) = args.interface {
        config.net_interface = interface;
    }

    let driver = build_driver(&config.command)?;
    let (seats, handles): (Vec<_>, Vec<_>) = (0..config.seat_count).map(seat_channel).unzip();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    let (trigger, shutdown) = shutdown_channel();
    let bridge = tokio::spawn(bridge::run(
        session.clone(),
        args.prefix.clone(),
        handles,
        shutdown.clone(),
    ));
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                trigger.trigger();
            }
            Err(e) => {
                // Keep the trigger alive: dropping it would stop the vehicle
                warn!("Unable to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });

    let diagnostics = Box::new(ProcNetDev::new(config.net_interface.clone()));
    let result = match args.vehicle {
        VehicleKind::Crawler => {
            let state = CrawlerState::new(&config.crawler)?;
            let vehicle = Vehicle::new(state, seats, driver).with_diagnostics(diagnostics);
            drive(vehicle, shutdown).await
        }
        VehicleKind::SmallRacer => {
            let state = SmallRacerState::new(&config.small_racer)?;
            let vehicle = Vehicle::new(state, seats, driver).with_diagnostics(diagnostics);
            drive(vehicle, shutdown).await
        }
    };

    bridge.abort();
    if let Err(e) = session.close().await {
        warn!("Failed closing Zenoh session: {}", e);
    }
    result.map_err(Into::into)
}

async fn drive<S: VehicleState>(
    mut vehicle: Vehicle<S, Box<dyn CommandDriver>>,
    shutdown: Shutdown,
) -> Result<(), VehicleError> {
    vehicle.init().await?;
    vehicle.run(shutdown).await
}

fn build_driver(config: &CommandConfig) -> Result<Box<dyn CommandDriver>, BoxError> {
    info!("Using {:?} command driver", config.driver);
    match config.driver {
        DriverKind::Sim => Ok(Box::new(SimDriver::new(config.servos.clone()))),
        #[cfg(feature = "pca9685")]
        DriverKind::Pca9685 => Ok(Box::new(
            rc_vehicle_runtime::driver::pca9685::Pca9685Driver::new(
                config.i2c_bus,
                config.address,
                config.servos.clone(),
            ),
        )),
        #[cfg(feature = "pi-pwm")]
        DriverKind::PiPwm => Ok(Box::new(rc_vehicle_runtime::driver::pi_pwm::PiPwmDriver::new(
            config.servos.clone(),
        ))),
        #[allow(unreachable_patterns)]
        other => Err(format!("{:?} driver not built in, enable its cargo feature", other).into()),
    }
}
