//! Device types for tracking cameras in a synchronization session

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::collaborator::{Controller, EventSubscription};
use crate::error::DeviceError;
use crate::firmware::{compare_versions, FirmwareStatus};
use crate::schedule::TaskKind;

/// Unique identifier for a device (serial number, or host plus child index)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    /// Create a DeviceId from a serial or any other stable string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identify a device by its host and position in the hierarchy
    pub fn from_host(host: &str, index: usize) -> Self {
        Self(format!("{}#{}", host, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a device in its hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    /// Single camera without children
    Standalone,
    /// Hub with child cameras behind it
    Parent,
    /// Camera reached through a parent hub
    Child,
}

impl DeviceRole {
    /// Standalone and Parent devices are the root of their hierarchy
    pub fn is_root(self) -> bool {
        matches!(self, Self::Standalone | Self::Parent)
    }
}

/// Identity block reported by a device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicInfo {
    /// User-assigned name
    #[serde(default)]
    pub alias: Option<String>,
    /// Hardware model (e.g. "C200")
    #[serde(default)]
    pub model: Option<String>,
    /// Installed firmware version
    #[serde(default)]
    pub firmware_version: Option<String>,
    /// Serial or MAC-derived identifier
    #[serde(default)]
    pub serial: Option<String>,
}

/// A child device listed by a hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildDescriptor {
    pub device_id: String,
    #[serde(default)]
    pub alias: Option<String>,
}

/// Snapshot of live device state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub basic: BasicInfo,
    /// Child devices; `Some` marks the device as a hub even when the list is empty
    #[serde(default)]
    pub children: Option<Vec<ChildDescriptor>>,
    /// Remaining device-specific readings (privacy mode, LEDs, motion settings, ...)
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Telemetry {
    pub fn is_hub(&self) -> bool {
        self.children.is_some()
    }
}

/// Opaque handle to a device's event endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsDevice(pub String);

/// Opaque handle to a device's management endpoint (clock, system settings)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagementHandle(pub String);

/// Both handles returned by event service discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHandles {
    pub device: EventsDevice,
    pub management: ManagementHandle,
}

/// Whether the event service of a device has been discovered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EventState {
    #[default]
    Unattached,
    Attached(EventHandles),
}

/// Whether motion events are being received; independent of [`EventState`]
#[derive(Default)]
pub enum SubscriptionState {
    #[default]
    NotSubscribed,
    Subscribed(Box<dyn EventSubscription>),
}

impl SubscriptionState {
    pub fn is_subscribed(&self) -> bool {
        matches!(self, Self::Subscribed(_))
    }
}

impl fmt::Debug for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSubscribed => f.write_str("NotSubscribed"),
            Self::Subscribed(_) => f.write_str("Subscribed"),
        }
    }
}

/// One camera in a session, with its controller and maintenance bookkeeping
pub struct DeviceNode {
    /// Stable device identifier
    pub id: DeviceId,
    /// Human-readable name
    pub name: String,
    /// Role in the hierarchy
    pub role: DeviceRole,
    /// Parent device ID (children only)
    pub parent_id: Option<DeviceId>,
    controller: Box<dyn Controller>,
    /// Epoch seconds of the last clock sync attempt (0 = never)
    pub last_time_sync: i64,
    /// Epoch seconds of the last media cleanup attempt (0 = never)
    pub last_media_cleanup: i64,
    /// Epoch seconds of the last firmware check attempt (0 = never)
    pub last_firmware_check: i64,
    /// Latest firmware version known to be available
    pub latest_firmware_version: Option<String>,
    pub event_state: EventState,
    pub subscription_state: SubscriptionState,
    /// Device clock minus coordinator clock, measured at attach time
    pub timezone_offset_secs: i64,
    /// Last successfully fetched telemetry
    pub telemetry: Option<Telemetry>,
}

impl DeviceNode {
    /// Create a node that owns `controller`; all maintenance timestamps start at 0
    pub fn new(
        id: DeviceId,
        name: impl Into<String>,
        role: DeviceRole,
        parent_id: Option<DeviceId>,
        controller: Box<dyn Controller>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            role,
            parent_id,
            controller,
            last_time_sync: 0,
            last_media_cleanup: 0,
            last_firmware_check: 0,
            latest_firmware_version: None,
            event_state: EventState::Unattached,
            subscription_state: SubscriptionState::NotSubscribed,
            timezone_offset_secs: 0,
            telemetry: None,
        }
    }

    pub fn controller(&self) -> &dyn Controller {
        self.controller.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.role.is_root()
    }

    pub fn is_attached(&self) -> bool {
        matches!(self.event_state, EventState::Attached(_))
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription_state.is_subscribed()
    }

    /// Management handle, present only once the event service is attached
    pub fn management(&self) -> Option<&ManagementHandle> {
        match &self.event_state {
            EventState::Attached(handles) => Some(&handles.management),
            EventState::Unattached => None,
        }
    }

    /// Timestamp of the last run of a maintenance task (0 for non-maintenance kinds)
    pub fn last_run(&self, task: TaskKind) -> i64 {
        match task {
            TaskKind::TimeSync => self.last_time_sync,
            TaskKind::MediaCleanup => self.last_media_cleanup,
            TaskKind::FirmwareCheck => self.last_firmware_check,
            _ => 0,
        }
    }

    pub fn set_last_run(&mut self, task: TaskKind, at: i64) {
        match task {
            TaskKind::TimeSync => self.last_time_sync = at,
            TaskKind::MediaCleanup => self.last_media_cleanup = at,
            TaskKind::FirmwareCheck => self.last_firmware_check = at,
            _ => {}
        }
    }

    /// Store a fetch result; a failed fetch leaves the previous snapshot in place.
    /// Returns true if the telemetry was replaced.
    pub fn apply_telemetry(&mut self, result: Result<Telemetry, DeviceError>) -> bool {
        match result {
            Ok(telemetry) => {
                self.telemetry = Some(telemetry);
                true
            }
            Err(_) => false,
        }
    }

    /// Compare installed firmware against the latest known version
    pub fn firmware_status(&self) -> FirmwareStatus {
        match &self.latest_firmware_version {
            Some(latest) => compare_versions(
                self.telemetry
                    .as_ref()
                    .and_then(|t| t.basic.firmware_version.as_deref()),
                latest,
            ),
            None => FirmwareStatus::CheckDisabled,
        }
    }

    /// Take the live subscription out of the node, leaving it NotSubscribed
    pub fn take_subscription(&mut self) -> Option<Box<dyn EventSubscription>> {
        match std::mem::take(&mut self.subscription_state) {
            SubscriptionState::Subscribed(subscription) => Some(subscription),
            SubscriptionState::NotSubscribed => None,
        }
    }

    /// Read-only view for observers and the status API
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            role: self.role,
            parent_id: self.parent_id.clone(),
            host: self.controller.host().to_string(),
            event_attached: self.is_attached(),
            subscribed: self.is_subscribed(),
            last_time_sync: self.last_time_sync,
            last_media_cleanup: self.last_media_cleanup,
            last_firmware_check: self.last_firmware_check,
            latest_firmware_version: self.latest_firmware_version.clone(),
            firmware: self.firmware_status(),
            timezone_offset_secs: self.timezone_offset_secs,
            telemetry: self.telemetry.clone(),
        }
    }
}

impl fmt::Debug for DeviceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceNode")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("parent_id", &self.parent_id)
            .field("event_state", &self.event_state)
            .field("subscription_state", &self.subscription_state)
            .field("last_time_sync", &self.last_time_sync)
            .field("last_media_cleanup", &self.last_media_cleanup)
            .field("last_firmware_check", &self.last_firmware_check)
            .finish_non_exhaustive()
    }
}

/// Serializable copy of a [`DeviceNode`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: DeviceId,
    pub name: String,
    pub role: DeviceRole,
    pub parent_id: Option<DeviceId>,
    pub host: String,
    pub event_attached: bool,
    pub subscribed: bool,
    pub last_time_sync: i64,
    pub last_media_cleanup: i64,
    pub last_firmware_check: i64,
    pub latest_firmware_version: Option<String>,
    pub firmware: FirmwareStatus,
    pub timezone_offset_secs: i64,
    pub telemetry: Option<Telemetry>,
}
