//! Periodic trigger for a coordinator
//!
//! Cycles are serialized through the coordinator's mutex, so a manual cycle
//! requested elsewhere simply waits for the periodic one to finish.

use crate::coordinator::SyncCoordinator;
use crate::report::CycleReport;
use crate::session::SessionId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Events emitted by a runner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    CycleCompleted {
        session: SessionId,
        report: CycleReport,
    },
}

/// Handle used to stop a running [`CycleRunner`]
#[derive(Debug, Clone)]
pub struct RunnerHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl RunnerHandle {
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

pub struct CycleRunner {
    coordinator: Arc<Mutex<SyncCoordinator>>,
    interval: Duration,
    event_tx: broadcast::Sender<SyncEvent>,
    shutdown_rx: watch::Receiver<bool>,
}

impl CycleRunner {
    pub fn new(
        coordinator: Arc<Mutex<SyncCoordinator>>,
        interval: Duration,
        event_tx: broadcast::Sender<SyncEvent>,
    ) -> (Self, RunnerHandle) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runner = Self {
            coordinator,
            interval,
            event_tx,
            shutdown_rx,
        };
        let handle = RunnerHandle {
            shutdown: Arc::new(shutdown_tx),
        };
        (runner, handle)
    }

    /// Subscribe to cycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Run cycles until shut down, then tear down the session
    pub async fn run(mut self) {
        let session = self.coordinator.lock().await.session().id();
        info!(session = %session, interval_secs = self.interval.as_secs(), "Cycle runner started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.coordinator.lock().await.run_cycle().await;
                    if self.event_tx.send(SyncEvent::CycleCompleted { session, report }).is_err() {
                        debug!(session = %session, "No listeners for cycle report");
                    }
                }
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.coordinator.lock().await.teardown().await;
        info!(session = %session, "Cycle runner stopped");
    }
}
