//! Throttling for low-frequency maintenance tasks
//!
//! Every maintenance task has a fixed period. A task is due once strictly more
//! than one period has elapsed since its last recorded run. The timestamp is
//! advanced to the cycle's start time whether or not the task succeeded, so a
//! persistently failing task is retried at most once per period.

use serde::{Deserialize, Serialize};

use crate::device::{DeviceNode, DeviceRole};

/// Units of work tracked in cycle reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Event service discovery
    EventAttach,
    /// Motion event subscription
    EventSubscribe,
    /// Device clock synchronization
    TimeSync,
    /// Local media retention cleanup
    MediaCleanup,
    /// Latest firmware version lookup
    FirmwareCheck,
    /// Telemetry refresh
    Telemetry,
    /// One-time audio level detection start
    NoiseDetection,
}

impl TaskKind {
    /// Throttled tasks, in execution order
    pub const MAINTENANCE: [TaskKind; 3] = [
        TaskKind::TimeSync,
        TaskKind::MediaCleanup,
        TaskKind::FirmwareCheck,
    ];

    pub fn is_maintenance(self) -> bool {
        Self::MAINTENANCE.contains(&self)
    }
}

/// Optional behaviour switched on per camera
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Subscribe to motion events
    #[serde(default)]
    pub motion_sensor: bool,
    /// Keep the device clock in sync with the coordinator
    #[serde(default)]
    pub time_sync: bool,
    /// Start audio level detection on observers that ask for it
    #[serde(default)]
    pub sound_detection: bool,
}

impl FeatureFlags {
    /// Event bootstrap and maintenance only run when one of these is enabled
    pub fn events_enabled(&self) -> bool {
        self.motion_sensor || self.time_sync
    }
}

/// Periods (seconds) of each maintenance task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenancePolicy {
    #[serde(default = "default_time_sync_period")]
    pub time_sync_period_secs: i64,
    #[serde(default = "default_media_cleanup_period")]
    pub media_cleanup_period_secs: i64,
    #[serde(default = "default_firmware_check_period")]
    pub firmware_check_period_secs: i64,
}

impl Default for MaintenancePolicy {
    fn default() -> Self {
        Self {
            time_sync_period_secs: default_time_sync_period(),
            media_cleanup_period_secs: default_media_cleanup_period(),
            firmware_check_period_secs: default_firmware_check_period(),
        }
    }
}

fn default_time_sync_period() -> i64 {
    86_400
}

fn default_media_cleanup_period() -> i64 {
    3_600
}

fn default_firmware_check_period() -> i64 {
    43_200
}

impl MaintenancePolicy {
    /// Period of a maintenance task, `None` for kinds that are not throttled
    pub fn period(&self, task: TaskKind) -> Option<i64> {
        match task {
            TaskKind::TimeSync => Some(self.time_sync_period_secs),
            TaskKind::MediaCleanup => Some(self.media_cleanup_period_secs),
            TaskKind::FirmwareCheck => Some(self.firmware_check_period_secs),
            _ => None,
        }
    }
}

/// True once strictly more than `period` seconds separate `now` from `last_run`
pub fn is_due(now: i64, last_run: i64, period: i64) -> bool {
    now.saturating_sub(last_run) > period
}

/// Decides which maintenance tasks a node should run this cycle
#[derive(Debug, Clone, Copy, Default)]
pub struct MaintenanceScheduler {
    policy: MaintenancePolicy,
    features: FeatureFlags,
}

impl MaintenanceScheduler {
    pub fn new(policy: MaintenancePolicy, features: FeatureFlags) -> Self {
        Self { policy, features }
    }

    /// Due tasks for `node`, in the fixed order TimeSync, MediaCleanup, FirmwareCheck
    ///
    /// Clock sync needs the feature flag and a standalone camera with an attached
    /// management handle. Children only take part in firmware checks.
    pub fn due_tasks(&self, node: &DeviceNode, now: i64) -> Vec<TaskKind> {
        TaskKind::MAINTENANCE
            .into_iter()
            .filter(|task| self.applies_to(*task, node))
            .filter(|task| {
                self.policy
                    .period(*task)
                    .is_some_and(|period| is_due(now, node.last_run(*task), period))
            })
            .collect()
    }

    /// Record an attempt; the timestamp is the cycle start, not the completion time
    pub fn record_run(&self, node: &mut DeviceNode, task: TaskKind, started_at: i64) {
        node.set_last_run(task, started_at);
    }

    fn applies_to(&self, task: TaskKind, node: &DeviceNode) -> bool {
        match task {
            TaskKind::TimeSync => {
                node.role == DeviceRole::Standalone
                    && self.features.time_sync
                    && node.is_attached()
            }
            TaskKind::MediaCleanup => node.is_root(),
            TaskKind::FirmwareCheck => true,
            _ => false,
        }
    }
}
