//! camsync Core - Core types, collaborator contracts, and maintenance scheduling
//!
//! This crate provides the foundational types for the camsync system:
//! - Device nodes holding per-device state, timestamps, and controller handles
//! - Collaborator traits for controllers, event services, media, firmware and observers
//! - Topology validation for parent/child camera hierarchies
//! - Throttling rules for low-frequency maintenance tasks
//! - Firmware version comparison

pub mod collaborator;
pub mod device;
pub mod error;
pub mod firmware;
pub mod schedule;
pub mod topology;

pub use collaborator::{
    Controller, ControllerRegistrar, Credentials, EventService, EventSubscription, FirmwareSource,
    MediaStore, Observer,
};
pub use device::{
    BasicInfo, ChildDescriptor, DeviceId, DeviceNode, DeviceRole, EventHandles, EventState,
    EventsDevice, ManagementHandle, NodeSnapshot, SubscriptionState, Telemetry,
};
pub use error::{DeviceError, ErrorKind, HierarchyError};
pub use firmware::{compare_versions, FirmwareStatus};
pub use schedule::{is_due, FeatureFlags, MaintenancePolicy, MaintenanceScheduler, TaskKind};
pub use topology::{Topology, TopologyGraph, TopologyNode};
