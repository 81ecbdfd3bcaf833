//! Simulated camera backend
//!
//! Stands in for the device protocol: registers controllers, serves the event
//! service and reports firmware versions for every `[[camera]]` entry, with
//! failures injected from `[camera.simulation]`.

use async_trait::async_trait;
use camsync_core::{
    BasicInfo, ChildDescriptor, Controller, ControllerRegistrar, Credentials, DeviceError,
    DeviceId, EventHandles, EventService, EventSubscription, EventsDevice, FirmwareSource,
    ManagementHandle, Telemetry,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::config::{CameraConfig, SimulationConfig};

/// Per-host simulation state
struct SimHost {
    settings: SimulationConfig,
    discovery_failures_left: AtomicU32,
}

pub struct SimulatedBackend {
    hosts: HashMap<String, Arc<SimHost>>,
}

impl SimulatedBackend {
    pub fn new(cameras: &[CameraConfig]) -> Self {
        let hosts = cameras
            .iter()
            .map(|camera| {
                let host = SimHost {
                    settings: camera.simulation.clone(),
                    discovery_failures_left: AtomicU32::new(camera.simulation.discovery_failures),
                };
                (camera.host.clone(), Arc::new(host))
            })
            .collect();
        Self { hosts }
    }

    fn host(&self, host: &str) -> Result<&Arc<SimHost>, DeviceError> {
        self.hosts
            .get(host)
            .ok_or_else(|| DeviceError::Network(format!("No device answering at {}", host)))
    }

    /// Child ids reported by a simulated hub
    pub fn child_ids(host: &str, count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("{}-cam{}", host, i)).collect()
    }
}

#[async_trait]
impl ControllerRegistrar for SimulatedBackend {
    async fn register(
        &self,
        host: &str,
        user: &str,
        _secret: &str,
        child_id: Option<&str>,
    ) -> Result<Box<dyn Controller>, DeviceError> {
        let sim = self.host(host)?.clone();
        if sim.settings.reject_auth {
            return Err(DeviceError::Auth(format!("{} refused login for {}", host, user)));
        }
        if let Some(child) = child_id {
            let known = Self::child_ids(host, sim.settings.children);
            if !known.iter().any(|id| id == child) {
                return Err(DeviceError::Protocol(format!("{} has no child {}", host, child)));
            }
        }

        debug!(host = %host, child = ?child_id, "Simulated controller registered");
        Ok(Box::new(SimController {
            host: host.to_string(),
            child_id: child_id.map(str::to_string),
            sim,
            fetches: AtomicU64::new(0),
        }))
    }
}

struct SimController {
    host: String,
    child_id: Option<String>,
    sim: Arc<SimHost>,
    fetches: AtomicU64,
}

impl SimController {
    fn telemetry(&self, fetch: u64) -> Telemetry {
        let settings = &self.sim.settings;
        let mut fields = serde_json::Map::new();
        fields.insert("uptime_fetches".into(), fetch.into());
        fields.insert("motion_detected".into(), (fetch % 5 == 0).into());

        match &self.child_id {
            Some(child) => Telemetry {
                basic: BasicInfo {
                    alias: Some(format!("Camera {}", child)),
                    model: Some("C420".to_string()),
                    firmware_version: Some(settings.firmware.clone()),
                    serial: Some(child.clone()),
                },
                children: None,
                fields,
            },
            None => {
                let is_hub = settings.children > 0;
                let children = is_hub.then(|| {
                    SimulatedBackend::child_ids(&self.host, settings.children)
                        .into_iter()
                        .map(|device_id| ChildDescriptor {
                            alias: Some(format!("Camera {}", device_id)),
                            device_id,
                        })
                        .collect()
                });
                Telemetry {
                    basic: BasicInfo {
                        alias: Some(format!("Simulated {}", self.host)),
                        model: Some(if is_hub { "H200" } else { "C200" }.to_string()),
                        firmware_version: Some(settings.firmware.clone()),
                        serial: Some(format!("SIM-{}", self.host)),
                    },
                    children,
                    fields,
                }
            }
        }
    }
}

#[async_trait]
impl Controller for SimController {
    fn host(&self) -> &str {
        &self.host
    }

    async fn fetch_telemetry(&self) -> Result<Telemetry, DeviceError> {
        let fetch = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        let every = self.sim.settings.telemetry_fail_every;
        if every > 0 && fetch % every == 0 {
            return Err(DeviceError::Network(format!(
                "{} timed out (fetch {})",
                self.host, fetch
            )));
        }
        Ok(self.telemetry(fetch))
    }

    async fn fetch_clock(&self) -> Result<i64, DeviceError> {
        Ok(Utc::now().timestamp() + self.sim.settings.clock_offset_secs)
    }
}

struct SimSubscription {
    active: AtomicBool,
}

#[async_trait]
impl EventSubscription for SimSubscription {
    fn is_alive(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn stop(&self) -> Result<(), DeviceError> {
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl EventService for SimulatedBackend {
    async fn discover(&self, credentials: &Credentials) -> Result<EventHandles, DeviceError> {
        let sim = self.host(&credentials.host)?;
        let remaining = sim
            .discovery_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if remaining.is_ok() {
            return Err(DeviceError::Discovery(format!(
                "{} did not answer event service discovery",
                credentials.host
            )));
        }

        Ok(EventHandles {
            device: EventsDevice(format!("sim://{}/events", credentials.host)),
            management: ManagementHandle(format!("sim://{}/device", credentials.host)),
        })
    }

    async fn subscribe(
        &self,
        handles: &EventHandles,
    ) -> Result<Box<dyn EventSubscription>, DeviceError> {
        debug!(events = %handles.device.0, "Simulated subscription created");
        Ok(Box::new(SimSubscription {
            active: AtomicBool::new(true),
        }))
    }

    async fn sync_time(&self, management: &ManagementHandle, now: i64) -> Result<(), DeviceError> {
        debug!(management = %management.0, now, "Simulated clock set");
        Ok(())
    }
}

#[async_trait]
impl FirmwareSource for SimulatedBackend {
    async fn latest_version(
        &self,
        device: &DeviceId,
        controller: &dyn Controller,
    ) -> Result<String, DeviceError> {
        let sim = self.host(controller.host())?;
        debug!(
            device = %device,
            latest = %sim.settings.latest_firmware,
            "Simulated firmware check"
        );
        Ok(sim.settings.latest_firmware.clone())
    }
}
