//! Per-cycle outcome report

use camsync_core::{DeviceError, DeviceId, ErrorKind, TaskKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A contained failure of one task on one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleFailure {
    pub task: TaskKind,
    pub device: DeviceId,
    pub kind: ErrorKind,
    pub message: String,
}

/// What a cycle attempted and what failed; a cycle itself never fails
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Epoch seconds observed at cycle start
    pub started_at: i64,
    /// Task kinds that invoked at least one collaborator
    pub attempted: BTreeSet<TaskKind>,
    /// Contained failures, in the order they happened
    pub failures: Vec<CycleFailure>,
    /// Number of observer publications
    pub published: usize,
    /// True when no observer was active and telemetry was not refreshed
    pub fanout_skipped: bool,
}

impl CycleReport {
    pub fn new(started_at: i64) -> Self {
        Self {
            started_at,
            ..Default::default()
        }
    }

    /// Fold one collaborator result into the report. Returns true on success.
    pub fn record<T>(
        &mut self,
        task: TaskKind,
        device: &DeviceId,
        result: &Result<T, DeviceError>,
    ) -> bool {
        self.attempted.insert(task);
        match result {
            Ok(_) => true,
            Err(e) => {
                self.failures.push(CycleFailure {
                    task,
                    device: device.clone(),
                    kind: e.kind(),
                    message: e.to_string(),
                });
                false
            }
        }
    }

    /// Failure kind recorded for a task on a device, if any
    pub fn failure(&self, task: TaskKind, device: &DeviceId) -> Option<ErrorKind> {
        self.failures
            .iter()
            .find(|f| f.task == task && &f.device == device)
            .map(|f| f.kind)
    }

    pub fn was_attempted(&self, task: TaskKind) -> bool {
        self.attempted.contains(&task)
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
