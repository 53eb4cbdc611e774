// Zenoh transport for seat queues
//
// <prefix>/seat/<n>/control   operator -> vehicle, JSON ControlState
// <prefix>/seat/<n>/hud       vehicle -> operator, JSON Hud
//
// Commands are pushed into the seat queue without waiting; the seat keeps only
// the newest one anyway.

use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use zenoh::Session;

use crate::messages::ControlState;
use crate::seat::SeatHandle;
use crate::shutdown::Shutdown;

pub const DEFAULT_PREFIX: &str = "rc";

pub type BridgeError = Box<dyn std::error::Error + Send + Sync>;

pub fn control_topic(prefix: &str, seat: usize) -> String {
    format!("{}/seat/{}/control", prefix, seat)
}

pub fn hud_topic(prefix: &str, seat: usize) -> String {
    format!("{}/seat/{}/hud", prefix, seat)
}

/// Bridge every seat until shutdown; fails on the first transport error
pub async fn run(
    session: Session,
    prefix: String,
    handles: Vec<SeatHandle>,
    shutdown: Shutdown,
) -> Result<(), BridgeError> {
    let mut tasks = JoinSet::new();
    for handle in handles {
        tasks.spawn(bridge_seat(
            session.clone(),
            prefix.clone(),
            handle,
            shutdown.clone(),
        ));
    }

    while let Some(joined) = tasks.join_next().await {
        joined??;
    }
    Ok(())
}

async fn bridge_seat(
    session: Session,
    prefix: String,
    handle: SeatHandle,
    mut shutdown: Shutdown,
) -> Result<(), BridgeError> {
    let SeatHandle {
        index,
        commands,
        mut hud,
    } = handle;

    let control = control_topic(&prefix, index);
    let telemetry = hud_topic(&prefix, index);
    let subscriber = session.declare_subscriber(control.clone()).await?;
    let publisher = session.declare_publisher(telemetry.clone()).await?;
    info!("Seat {}: subscribed to {}, publishing to {}", index, control, telemetry);

    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                debug!("Seat {} bridge stopping", index);
                return Ok(());
            }
            sample = subscriber.recv_async() => {
                let sample = sample?;
                let payload = sample.payload().to_bytes();
                let command = match serde_json::from_slice::<ControlState>(&payload) {
                    Ok(command) => command,
                    Err(e) => {
                        warn!("Seat {}: failed to parse command: {}", index, e);
                        continue;
                    }
                };
                match commands.try_send(command) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!("Seat {} command queue full, dropping command", index);
                    }
                    Err(TrySendError::Closed(_)) => {
                        info!("Seat {} closed, bridge stopping", index);
                        return Ok(());
                    }
                }
            }
            record = hud.recv() => match record {
                Some(record) => {
                    let json = serde_json::to_string(&record)?;
                    publisher.put(json).await?;
                }
                None => {
                    info!("Seat {} HUD closed, bridge stopping", index);
                    return Ok(());
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics() {
        assert_eq!(control_topic("rc", 0), "rc/seat/0/control");
        assert_eq!(hud_topic("garage/crawler", 1), "garage/crawler/seat/1/hud");
    }
}
