//! camsync Coordinator - Recurring synchronization of a camera hierarchy
//!
//! This crate drives one session (a root camera plus optional children) through
//! repeated cycles:
//! - Event bootstrap: discover and subscribe to the root's event service, retrying each cycle
//! - Maintenance: throttled clock sync, media cleanup and firmware checks
//! - Telemetry fanout: refresh every controller and publish to active observers
//!
//! Failures of one device or task are recorded in the [`CycleReport`] and never
//! abort the cycle.

pub mod bootstrap;
pub mod coordinator;
pub mod fanout;
pub mod report;
pub mod runner;
pub mod session;

#[cfg(test)]
pub(crate) mod testkit;

pub use bootstrap::{BootstrapOutcome, EventBootstrap};
pub use coordinator::{Collaborators, SyncCoordinator};
pub use fanout::TelemetryFanout;
pub use report::{CycleFailure, CycleReport};
pub use runner::{CycleRunner, RunnerHandle, SyncEvent};
pub use session::{Session, SessionError, SessionId};
