//! SyncCoordinator: one cycle of bootstrap, maintenance and telemetry fanout
//!
//! A cycle never fails. Every collaborator result is folded into the
//! [`CycleReport`]; maintenance timestamps advance to the cycle's start time
//! whether the task succeeded or not, so a failing task is retried once per
//! period rather than every cycle.

use crate::bootstrap::EventBootstrap;
use crate::fanout::TelemetryFanout;
use crate::report::CycleReport;
use crate::session::Session;
use camsync_core::{
    Credentials, DeviceError, DeviceNode, EventService, FeatureFlags, FirmwareSource,
    MaintenancePolicy, MaintenanceScheduler, MediaStore, TaskKind,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// External services shared by every cycle of a session
#[derive(Clone)]
pub struct Collaborators {
    pub events: Arc<dyn EventService>,
    pub media: Arc<dyn MediaStore>,
    pub firmware: Arc<dyn FirmwareSource>,
}

pub struct SyncCoordinator {
    session: Session,
    bootstrap: EventBootstrap,
    scheduler: MaintenanceScheduler,
    collaborators: Collaborators,
    features: FeatureFlags,
    fanout: TelemetryFanout,
}

impl SyncCoordinator {
    pub fn new(
        session: Session,
        collaborators: Collaborators,
        features: FeatureFlags,
        policy: MaintenancePolicy,
    ) -> Self {
        Self {
            session,
            bootstrap: EventBootstrap::new(collaborators.events.clone(), features),
            scheduler: MaintenanceScheduler::new(policy, features),
            collaborators,
            features,
            fanout: TelemetryFanout::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Run one cycle against the wall clock
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.run_cycle_at(Utc::now().timestamp()).await
    }

    /// Run one cycle with `now` as the observed time (epoch seconds)
    pub async fn run_cycle_at(&mut self, now: i64) -> CycleReport {
        let mut report = CycleReport::new(now);
        if self.session.is_closed() {
            debug!(session = %self.session.id(), "Session closed, cycle skipped");
            return report;
        }

        let Self {
            session,
            bootstrap,
            scheduler,
            collaborators,
            features,
            fanout,
        } = self;

        if features.events_enabled() {
            let credentials = session.credentials().clone();
            if let Some(root) = session.root_mut() {
                if bootstrap.applies_to(root) {
                    bootstrap_root(bootstrap, root, &credentials, &mut report).await;
                }
            }
            for node in session.nodes_mut() {
                run_maintenance(scheduler, collaborators, node, now, &mut report).await;
            }
        } else {
            debug!(
                session = %session.id(),
                "Events and time sync disabled, skipping bootstrap and maintenance"
            );
        }

        fanout.run(session, &mut report).await;

        info!(
            session = %session.id(),
            attempted = report.attempted.len(),
            failures = report.failures.len(),
            published = report.published,
            "Cycle complete"
        );
        report
    }

    /// Stop event delivery for the session; further cycles are no-ops
    pub async fn teardown(&mut self) {
        self.session.teardown(&self.bootstrap).await;
    }
}

async fn bootstrap_root(
    bootstrap: &EventBootstrap,
    root: &mut DeviceNode,
    credentials: &Credentials,
    report: &mut CycleReport,
) {
    if !root.is_attached() {
        let result = bootstrap.ensure_attached(root, credentials).await;
        if let Err(e) = &result {
            warn!(
                device = %root.id,
                error = %e,
                "Event service discovery failed, retrying next cycle"
            );
        }
        report.record(TaskKind::EventAttach, &root.id, &result);
    }

    if root.is_attached() {
        let result = bootstrap.ensure_subscribed(root).await;
        match &result {
            Ok(outcome) => debug!(device = %root.id, ?outcome, "Subscription checked"),
            Err(e) => warn!(
                device = %root.id,
                error = %e,
                "Event subscription failed, retrying next cycle"
            ),
        }
        report.record(TaskKind::EventSubscribe, &root.id, &result);
    }
}

async fn run_maintenance(
    scheduler: &MaintenanceScheduler,
    collaborators: &Collaborators,
    node: &mut DeviceNode,
    now: i64,
    report: &mut CycleReport,
) {
    for task in scheduler.due_tasks(node, now) {
        let result: Result<(), DeviceError> = match task {
            TaskKind::TimeSync => match node.management() {
                Some(management) => collaborators.events.sync_time(management, now).await,
                None => continue,
            },
            TaskKind::MediaCleanup => collaborators.media.purge_expired(&node.id).await,
            TaskKind::FirmwareCheck => {
                let result = collaborators
                    .firmware
                    .latest_version(&node.id, node.controller())
                    .await;
                match result {
                    Ok(latest) => {
                        debug!(device = %node.id, latest = %latest, "Firmware check complete");
                        node.latest_firmware_version = Some(latest);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            _ => continue,
        };

        if let Err(e) = &result {
            warn!(device = %node.id, task = ?task, error = %e, "Maintenance task failed");
        }
        report.record(task, &node.id, &result);
        scheduler.record_run(node, task, now);
    }
}
