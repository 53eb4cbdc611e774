// Broadcast cancellation shared by every task (seats, tick loop, bridge)

use tokio::sync::watch;

/// Sending half: trigger once, every `Shutdown` clone observes it
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving half, cheap to clone into each task
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn shutdown_channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // send_replace never fails, even with no receivers left
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    /// Resolves once shutdown is triggered or the trigger is dropped
    pub async fn wait(&mut self) {
        // Err means the trigger was dropped, which also counts as shutdown
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_all_clones_observe_trigger() {
        let (trigger, shutdown) = shutdown_channel();
        let mut a = shutdown.clone();
        let mut b = shutdown.clone();
        assert!(
            tokio::time::timeout(Duration::from_millis(20), a.wait())
                .await
                .is_err()
        );

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), a.wait()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), b.wait()).await.unwrap();
        // Clones made after the trigger see it too
        let mut late = shutdown.clone();
        tokio::time::timeout(Duration::from_secs(1), late.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_trigger_counts_as_shutdown() {
        let (trigger, mut shutdown) = shutdown_channel();
        drop(trigger);
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait()).await.unwrap();
    }
}
