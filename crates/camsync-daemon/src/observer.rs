//! Observer registry: one telemetry observer per device
//!
//! Observers keep the latest published snapshot and forward every publication
//! to WebSocket clients. Disabling an observer through the API makes the next
//! cycle skip it (and skip telemetry refresh entirely if none remain enabled).

use async_trait::async_trait;
use camsync_core::{DeviceError, DeviceId, Observer, Telemetry};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// A telemetry publication, as sent to WebSocket clients
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryUpdate {
    pub device: DeviceId,
    pub telemetry: Telemetry,
}

pub struct DeviceObserver {
    device: DeviceId,
    enabled: AtomicBool,
    sound_detection: bool,
    listening: AtomicBool,
    latest: RwLock<Option<Telemetry>>,
    updates: broadcast::Sender<TelemetryUpdate>,
}

impl DeviceObserver {
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Whether noise detection has been started for this device
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    pub fn latest(&self) -> Option<Telemetry> {
        self.latest.read().ok().and_then(|latest| latest.clone())
    }
}

#[async_trait]
impl Observer for DeviceObserver {
    fn device_id(&self) -> &DeviceId {
        &self.device
    }

    fn is_active(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn wants_sound_detection(&self) -> bool {
        self.sound_detection
    }

    fn publish(&self, telemetry: &Telemetry) {
        if let Ok(mut latest) = self.latest.write() {
            *latest = Some(telemetry.clone());
        }
        // Nobody listening is fine
        let _ = self.updates.send(TelemetryUpdate {
            device: self.device.clone(),
            telemetry: telemetry.clone(),
        });
    }

    async fn start_noise_detection(&self) -> Result<(), DeviceError> {
        self.listening.store(true, Ordering::SeqCst);
        info!(device = %self.device, "Noise detection started");
        Ok(())
    }
}

/// All observers of the daemon, keyed by device
pub struct ObserverRegistry {
    observers: RwLock<HashMap<DeviceId, Arc<DeviceObserver>>>,
    updates: broadcast::Sender<TelemetryUpdate>,
}

impl ObserverRegistry {
    pub fn new(updates: broadcast::Sender<TelemetryUpdate>) -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            updates,
        }
    }

    /// Create (or return the existing) observer for a device; observers start enabled
    pub fn observe(&self, device: &DeviceId, sound_detection: bool) -> Arc<DeviceObserver> {
        let mut observers = match self.observers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        observers
            .entry(device.clone())
            .or_insert_with(|| {
                debug!(device = %device, sound_detection, "Observer registered");
                Arc::new(DeviceObserver {
                    device: device.clone(),
                    enabled: AtomicBool::new(true),
                    sound_detection,
                    listening: AtomicBool::new(false),
                    latest: RwLock::new(None),
                    updates: self.updates.clone(),
                })
            })
            .clone()
    }

    pub fn get(&self, device: &DeviceId) -> Option<Arc<DeviceObserver>> {
        self.observers
            .read()
            .ok()
            .and_then(|observers| observers.get(device).cloned())
    }

    /// Enable or disable an observer. Returns false for unknown devices.
    pub fn set_enabled(&self, device: &DeviceId, enabled: bool) -> bool {
        match self.get(device) {
            Some(observer) => {
                observer.set_enabled(enabled);
                info!(device = %device, enabled, "Observer toggled");
                true
            }
            None => false,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryUpdate> {
        self.updates.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camsync_core::BasicInfo;

    fn registry() -> ObserverRegistry {
        let (updates, _) = broadcast::channel(8);
        ObserverRegistry::new(updates)
    }

    #[tokio::test]
    async fn test_publish_stores_and_broadcasts() {
        let registry = registry();
        let mut rx = registry.subscribe();
        let observer = registry.observe(&DeviceId::new("cam"), false);
        assert!(observer.is_active());

        let telemetry = Telemetry {
            basic: BasicInfo {
                alias: Some("Front door".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        observer.publish(&telemetry);

        assert_eq!(observer.latest(), Some(telemetry.clone()));
        let update = rx.recv().await.unwrap();
        assert_eq!(update.device, DeviceId::new("cam"));
        assert_eq!(update.telemetry, telemetry);
    }

    #[tokio::test]
    async fn test_toggle_and_noise_detection() {
        let registry = registry();
        let observer = registry.observe(&DeviceId::new("cam"), true);
        let again = registry.observe(&DeviceId::new("cam"), true);
        assert!(Arc::ptr_eq(&observer, &again));

        assert!(registry.set_enabled(&DeviceId::new("cam"), false));
        assert!(!observer.is_active());
        assert!(!registry.set_enabled(&DeviceId::new("other"), true));

        assert!(observer.wants_sound_detection());
        observer.start_noise_detection().await.unwrap();
        assert!(observer.is_listening());
    }
}
