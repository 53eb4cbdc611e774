// Keyboard operator for seat 0: W throttle, S brake, A/D steer,
// E/Q shift up/down, Z/C trim left/right, X quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

use rc_vehicle_runtime::bridge::{DEFAULT_PREFIX, control_topic, hud_topic};
use rc_vehicle_runtime::config::AXIS_COUNT;
use rc_vehicle_runtime::messages::{ControlState, Hud};

const FRAME: Duration = Duration::from_millis(33); // ~30Hz
const INPUT_TIMEOUT: Duration = Duration::from_millis(100); // Release sticks/buttons after this long with no key
const HUD_EVERY: Duration = Duration::from_secs(1);

// Button indices understood by the driver seat
const TRIM_LEFT: usize = 0;
const TRIM_RIGHT: usize = 1;
const UPSHIFT: usize = 3;
const DOWNSHIFT: usize = 4;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(control_topic(DEFAULT_PREFIX, 0)).await?;
    let hud = session.declare_subscriber(hud_topic(DEFAULT_PREFIX, 0)).await?;

    info!("Controls: W/S=throttle/brake, A/D=steer, E/Q=shift, Z/C=trim, X=quit");

    enable_raw_mode()?;
    let result = run_teleop(&publisher, &hud).await;
    disable_raw_mode()?;

    result
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
    hud: &zenoh::pubsub::Subscriber<zenoh::handlers::FifoChannelHandler<zenoh::sample::Sample>>,
) -> Result<(), BoxError> {
    let mut axes = vec![0.0; AXIS_COUNT];
    axes[1] = -1.0; // throttle released
    axes[2] = -1.0; // brake released
    let mut buttons: u32 = 0;
    let mut last_input = Instant::now();
    let mut last_hud = Instant::now();

    loop {
        if event::poll(FRAME)? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => axes[1] = 1.0,
                    KeyCode::Char('s') if pressed => axes[2] = 1.0,
                    KeyCode::Char('a') if pressed => axes[0] = -1.0,
                    KeyCode::Char('d') if pressed => axes[0] = 1.0,

                    KeyCode::Char('e') if pressed => buttons |= 1 << UPSHIFT,
                    KeyCode::Char('q') if pressed => buttons |= 1 << DOWNSHIFT,
                    KeyCode::Char('z') if pressed => buttons |= 1 << TRIM_LEFT,
                    KeyCode::Char('c') if pressed => buttons |= 1 << TRIM_RIGHT,

                    // Quit
                    KeyCode::Char('x') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
                last_input = Instant::now();
            }
        }

        if last_input.elapsed() > INPUT_TIMEOUT {
            axes[0] = 0.0;
            axes[1] = -1.0;
            axes[2] = -1.0;
            buttons = 0;
        }

        let command = ControlState::new(axes.clone(), buttons, now_ms());
        publisher.put(serde_json::to_string(&command)?).await?;

        // Latest HUD, once a second
        let mut latest = None;
        while let Ok(Some(sample)) = hud.try_recv() {
            latest = Some(sample);
        }
        if let Some(sample) = latest {
            if last_hud.elapsed() > HUD_EVERY {
                match serde_json::from_slice::<Hud>(&sample.payload().to_bytes()) {
                    Ok(record) => info!("{}\r", record.lines.join(" || ")),
                    Err(e) => warn!("Failed to parse HUD: {}", e),
                }
                last_hud = Instant::now();
            }
        }
    }

    Ok(())
}
