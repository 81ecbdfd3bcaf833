//! Telemetry fanout: refresh every controller and publish to active observers

use crate::report::CycleReport;
use crate::session::Session;
use camsync_core::{DeviceError, DeviceId, DeviceNode, Observer, TaskKind, Telemetry};
use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-hierarchy fanout state
#[derive(Debug, Default)]
pub struct TelemetryFanout {
    noise_detection_started: bool,
}

impl TelemetryFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn noise_detection_started(&self) -> bool {
        self.noise_detection_started
    }

    pub fn any_active(observers: &[Arc<dyn Observer>]) -> bool {
        observers.iter().any(|o| o.is_active())
    }

    /// Fetch telemetry from every controller concurrently.
    ///
    /// Each fetch only reads its own node, so results are applied afterwards.
    pub async fn fetch_all(
        nodes: &[DeviceNode],
    ) -> Vec<(DeviceId, Result<Telemetry, DeviceError>)> {
        let fetches = nodes.iter().map(|node| async move {
            (node.id.clone(), node.controller().fetch_telemetry().await)
        });
        join_all(fetches).await
    }

    /// Refresh, publish and lazily start noise detection
    pub async fn run(&mut self, session: &mut Session, report: &mut CycleReport) {
        if !Self::any_active(session.observers()) {
            debug!(session = %session.id(), "No active observers, skipping telemetry refresh");
            report.fanout_skipped = true;
            return;
        }

        let results = Self::fetch_all(session.nodes()).await;
        let refreshed = apply_results(session.nodes_mut(), results, report);

        for observer in session.observers().iter().filter(|o| o.is_active()) {
            let device = observer.device_id();
            if !refreshed.contains(device) {
                continue;
            }
            if let Some(telemetry) = session.node(device).and_then(|n| n.telemetry.as_ref()) {
                observer.publish(telemetry);
                report.published += 1;
            }
        }

        if !self.noise_detection_started {
            let candidate = session
                .observers()
                .iter()
                .find(|o| o.is_active() && o.wants_sound_detection());
            if let Some(observer) = candidate {
                self.noise_detection_started = true;
                let result = observer.start_noise_detection().await;
                if let Err(e) = &result {
                    warn!(
                        device = %observer.device_id(),
                        error = %e,
                        "Noise detection failed to start"
                    );
                }
                report.record(TaskKind::NoiseDetection, observer.device_id(), &result);
            }
        }
    }
}

fn apply_results(
    nodes: &mut [DeviceNode],
    results: Vec<(DeviceId, Result<Telemetry, DeviceError>)>,
    report: &mut CycleReport,
) -> HashSet<DeviceId> {
    results
        .into_iter()
        .fold(HashSet::new(), |mut refreshed, (id, result)| {
            report.record(TaskKind::Telemetry, &id, &result);
            if let Err(e) = &result {
                warn!(device = %id, error = %e, "Telemetry refresh failed, keeping last snapshot");
            }
            if let Some(node) = nodes.iter_mut().find(|n| n.id == id) {
                if node.apply_telemetry(result) {
                    refreshed.insert(id);
                }
            }
            refreshed
        })
}
