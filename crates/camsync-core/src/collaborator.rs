//! Contracts for the external collaborators driven by the coordinator
//!
//! The coordinator never talks to a device directly. Everything that touches
//! the network, the filesystem or a UI goes through one of these traits so
//! that the orchestration logic can be exercised against in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::device::{DeviceId, EventHandles, ManagementHandle, Telemetry};
use crate::error::DeviceError;

/// Login material for one camera host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Host name or IP address of the camera
    pub host: String,
    /// Local account user name
    pub username: String,
    /// Local account password
    pub password: String,
    /// Cloud account password; when set the controller logs in as `admin` with it
    #[serde(default)]
    pub cloud_password: Option<String>,
}

impl Credentials {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            cloud_password: None,
        }
    }

    /// Returns a copy using the given cloud password (empty strings are ignored)
    pub fn with_cloud_password(mut self, cloud_password: impl Into<String>) -> Self {
        let cloud_password = cloud_password.into();
        self.cloud_password = (!cloud_password.is_empty()).then_some(cloud_password);
        self
    }

    /// User/secret pair used to register the command controller
    pub fn controller_login(&self) -> (&str, &str) {
        match self.cloud_password.as_deref() {
            Some(cloud) => ("admin", cloud),
            None => (&self.username, &self.password),
        }
    }

    /// Secret used when registering child controllers through the parent
    pub fn child_secret(&self) -> &str {
        self.cloud_password.as_deref().unwrap_or(&self.password)
    }
}

/// Command/control client for a single camera (or a child behind a hub)
#[async_trait]
pub trait Controller: Send + Sync {
    /// Host this controller talks to
    fn host(&self) -> &str;

    /// Fetch a fresh telemetry snapshot
    async fn fetch_telemetry(&self) -> Result<Telemetry, DeviceError>;

    /// Read the device clock as epoch seconds
    async fn fetch_clock(&self) -> Result<i64, DeviceError>;
}

/// Creates controllers for a host, optionally addressing a child device
#[async_trait]
pub trait ControllerRegistrar: Send + Sync {
    async fn register(
        &self,
        host: &str,
        user: &str,
        secret: &str,
        child_id: Option<&str>,
    ) -> Result<Box<dyn Controller>, DeviceError>;
}

/// Live event subscription; dropped back to "not subscribed" once it dies
#[async_trait]
pub trait EventSubscription: Send + Sync {
    /// Whether the subscription is still delivering events
    fn is_alive(&self) -> bool {
        true
    }

    /// Stop the subscription (teardown only)
    async fn stop(&self) -> Result<(), DeviceError>;
}

/// Event-notification service of a camera
#[async_trait]
pub trait EventService: Send + Sync {
    /// Locate the event and management endpoints of a device
    async fn discover(&self, credentials: &Credentials) -> Result<EventHandles, DeviceError>;

    /// Subscribe to motion events using previously discovered endpoints
    async fn subscribe(
        &self,
        handles: &EventHandles,
    ) -> Result<Box<dyn EventSubscription>, DeviceError>;

    /// Set the device clock through its management endpoint
    async fn sync_time(&self, management: &ManagementHandle, now: i64) -> Result<(), DeviceError>;
}

/// Local media retention
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn purge_expired(&self, device: &DeviceId) -> Result<(), DeviceError>;
}

/// Source of the latest firmware version available for a device
#[async_trait]
pub trait FirmwareSource: Send + Sync {
    async fn latest_version(
        &self,
        device: &DeviceId,
        controller: &dyn Controller,
    ) -> Result<String, DeviceError>;
}

/// Consumer of telemetry attached to one device (an entity in a UI, a logger, ...)
#[async_trait]
pub trait Observer: Send + Sync {
    /// Device this observer renders
    fn device_id(&self) -> &DeviceId;

    /// Observers can be enabled and disabled between cycles
    fn is_active(&self) -> bool;

    /// Whether this observer is configured for sound detection
    fn wants_sound_detection(&self) -> bool {
        false
    }

    /// Receive a fresh snapshot
    fn publish(&self, telemetry: &Telemetry);

    /// Start audio level detection; invoked at most once per hierarchy
    async fn start_noise_detection(&self) -> Result<(), DeviceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_login_prefers_cloud_password() {
        let creds = Credentials::new("10.0.0.5", "operator", "local").with_cloud_password("cloud");
        assert_eq!(creds.controller_login(), ("admin", "cloud"));
        assert_eq!(creds.child_secret(), "cloud");
    }

    #[test]
    fn test_controller_login_without_cloud_password() {
        let creds = Credentials::new("10.0.0.5", "operator", "local").with_cloud_password("");
        assert_eq!(creds.cloud_password, None);
        assert_eq!(creds.controller_login(), ("operator", "local"));
    }
}
