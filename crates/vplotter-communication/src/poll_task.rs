//! Background position polling
//!
//! Refreshes the session position on a fixed interval. Each refresh runs on
//! the blocking pool since it sleeps and reads the serial port; refreshes
//! that find the session busy are skipped.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, trace};

use crate::session::{MachineSession, PollOutcome};

/// Handle to a running poll task
pub struct PollTask {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl PollTask {
    /// Start polling `session` every `interval` on the current runtime
    pub fn spawn(session: MachineSession, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            debug!("Position polling every {:?}", interval);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        let session = session.clone();
                        match tokio::task::spawn_blocking(move || session.refresh_position()).await {
                            Ok(Ok(PollOutcome::Updated(snapshot))) => trace!("Polled {}", snapshot),
                            Ok(Ok(PollOutcome::Skipped)) => trace!("Poll skipped"),
                            // Already surfaced to the session listeners.
                            Ok(Err(e)) => trace!("Poll failed: {}", e),
                            Err(e) => {
                                error!("Poll task panicked: {}", e);
                                break;
                            }
                        }
                    }
                }
            }
            debug!("Position polling stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Check if the task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop polling and wait for the task to exit
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.handle.await;
    }
}
