//! Scripted in-memory collaborators for coordinator tests

use async_trait::async_trait;
use camsync_core::{
    BasicInfo, ChildDescriptor, Controller, ControllerRegistrar, Credentials, DeviceError,
    DeviceId, DeviceNode, DeviceRole, EventHandles, EventService, EventSubscription, EventsDevice,
    FirmwareSource, ManagementHandle, MediaStore, Observer, Telemetry,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn telemetry(alias: &str, firmware: &str) -> Telemetry {
    Telemetry {
        basic: BasicInfo {
            alias: Some(alias.to_string()),
            model: Some("C200".to_string()),
            firmware_version: Some(firmware.to_string()),
            serial: None,
        },
        children: None,
        fields: Default::default(),
    }
}

/// Shared behaviour of a fake controller; tests keep a handle after boxing
#[derive(Default)]
pub struct ControllerScript {
    pub telemetry: Mutex<Telemetry>,
    pub clock: Mutex<i64>,
    pub fail_telemetry: AtomicBool,
    pub fetches: AtomicUsize,
}

impl ControllerScript {
    pub fn new(telemetry: Telemetry) -> Arc<Self> {
        Arc::new(Self {
            telemetry: Mutex::new(telemetry),
            ..Default::default()
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_telemetry.store(failing, Ordering::SeqCst);
    }

    pub fn set_telemetry(&self, telemetry: Telemetry) {
        *self.telemetry.lock().unwrap() = telemetry;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

pub struct FakeController {
    host: String,
    script: Arc<ControllerScript>,
}

impl FakeController {
    pub fn boxed(host: &str, script: Arc<ControllerScript>) -> Box<dyn Controller> {
        Box::new(Self {
            host: host.to_string(),
            script,
        })
    }
}

#[async_trait]
impl Controller for FakeController {
    fn host(&self) -> &str {
        &self.host
    }

    async fn fetch_telemetry(&self) -> Result<Telemetry, DeviceError> {
        self.script.fetches.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_telemetry.load(Ordering::SeqCst) {
            return Err(DeviceError::Network(format!("{} unreachable", self.host)));
        }
        Ok(self.script.telemetry.lock().unwrap().clone())
    }

    async fn fetch_clock(&self) -> Result<i64, DeviceError> {
        Ok(*self.script.clock.lock().unwrap())
    }
}

/// Registrar handing out controllers keyed by child id (`None` for the root)
#[derive(Default)]
pub struct FakeRegistrar {
    pub scripts: HashMap<Option<String>, Arc<ControllerScript>>,
    pub reject_auth: bool,
    pub logins: Mutex<Vec<(String, String, Option<String>)>>,
}

#[async_trait]
impl ControllerRegistrar for FakeRegistrar {
    async fn register(
        &self,
        host: &str,
        user: &str,
        secret: &str,
        child_id: Option<&str>,
    ) -> Result<Box<dyn Controller>, DeviceError> {
        self.logins.lock().unwrap().push((
            user.to_string(),
            secret.to_string(),
            child_id.map(str::to_string),
        ));
        if self.reject_auth {
            return Err(DeviceError::Auth(format!("{} rejected {}", host, user)));
        }
        let script = self
            .scripts
            .get(&child_id.map(str::to_string))
            .cloned()
            .ok_or_else(|| DeviceError::Network(format!("no device behind {}", host)))?;
        Ok(FakeController::boxed(host, script))
    }
}

/// Event service failing a configurable number of discover/subscribe calls
#[derive(Default)]
pub struct FakeEventService {
    pub discover_failures: AtomicUsize,
    pub subscribe_failures: AtomicUsize,
    pub discover_calls: AtomicUsize,
    pub subscribe_calls: AtomicUsize,
    pub sync_calls: Mutex<Vec<i64>>,
    pub fail_sync: AtomicBool,
    pub subscription_alive: Arc<AtomicBool>,
    pub stops: Arc<AtomicUsize>,
}

impl FakeEventService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscription_alive: Arc::new(AtomicBool::new(true)),
            ..Default::default()
        })
    }

    pub fn failing_discovery(times: usize) -> Arc<Self> {
        let service = Self::new();
        service.discover_failures.store(times, Ordering::SeqCst);
        service
    }

    pub fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

struct FakeSubscription {
    alive: Arc<AtomicBool>,
    stops: Arc<AtomicUsize>,
}

#[async_trait]
impl EventSubscription for FakeSubscription {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn stop(&self) -> Result<(), DeviceError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl EventService for FakeEventService {
    async fn discover(&self, credentials: &Credentials) -> Result<EventHandles, DeviceError> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.discover_failures) {
            return Err(DeviceError::Discovery(format!(
                "{} did not answer",
                credentials.host
            )));
        }
        Ok(EventHandles {
            device: EventsDevice(format!("http://{}:2020/events", credentials.host)),
            management: ManagementHandle(format!("http://{}:2020/device", credentials.host)),
        })
    }

    async fn subscribe(
        &self,
        _handles: &EventHandles,
    ) -> Result<Box<dyn EventSubscription>, DeviceError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.subscribe_failures) {
            return Err(DeviceError::Subscription("pull point refused".into()));
        }
        self.subscription_alive.store(true, Ordering::SeqCst);
        Ok(Box::new(FakeSubscription {
            alive: self.subscription_alive.clone(),
            stops: self.stops.clone(),
        }))
    }

    async fn sync_time(&self, _management: &ManagementHandle, now: i64) -> Result<(), DeviceError> {
        self.sync_calls.lock().unwrap().push(now);
        if self.fail_sync.load(Ordering::SeqCst) {
            return Err(DeviceError::Network("set time timed out".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeMedia {
    pub purged: Mutex<Vec<DeviceId>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl MediaStore for FakeMedia {
    async fn purge_expired(&self, device: &DeviceId) -> Result<(), DeviceError> {
        self.purged.lock().unwrap().push(device.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeviceError::Protocol("media directory unreadable".into()));
        }
        Ok(())
    }
}

pub struct FakeFirmware {
    pub latest: String,
    pub checked: Mutex<Vec<DeviceId>>,
    pub fail: AtomicBool,
}

impl FakeFirmware {
    pub fn new(latest: &str) -> Arc<Self> {
        Arc::new(Self {
            latest: latest.to_string(),
            checked: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        })
    }

    pub fn checked(&self) -> Vec<DeviceId> {
        self.checked.lock().unwrap().clone()
    }
}

#[async_trait]
impl FirmwareSource for FakeFirmware {
    async fn latest_version(
        &self,
        device: &DeviceId,
        _controller: &dyn Controller,
    ) -> Result<String, DeviceError> {
        self.checked.lock().unwrap().push(device.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeviceError::Network("update server unreachable".into()));
        }
        Ok(self.latest.clone())
    }
}

pub struct FakeObserver {
    pub device: DeviceId,
    pub active: AtomicBool,
    pub sound: bool,
    pub published: Mutex<Vec<Telemetry>>,
    pub noise_starts: AtomicUsize,
}

impl FakeObserver {
    pub fn new(device: &DeviceId, active: bool, sound: bool) -> Arc<Self> {
        Arc::new(Self {
            device: device.clone(),
            active: AtomicBool::new(active),
            sound,
            published: Mutex::new(Vec::new()),
            noise_starts: AtomicUsize::new(0),
        })
    }

    pub fn published(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    pub fn noise_starts(&self) -> usize {
        self.noise_starts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Observer for FakeObserver {
    fn device_id(&self) -> &DeviceId {
        &self.device
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn wants_sound_detection(&self) -> bool {
        self.sound
    }

    fn publish(&self, telemetry: &Telemetry) {
        self.published.lock().unwrap().push(telemetry.clone());
    }

    async fn start_noise_detection(&self) -> Result<(), DeviceError> {
        self.noise_starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn credentials() -> Credentials {
    Credentials::new("192.168.1.50", "operator", "secret")
}

pub fn standalone(script: &Arc<ControllerScript>) -> DeviceNode {
    DeviceNode::new(
        DeviceId::new("cam"),
        "Front door",
        DeviceRole::Standalone,
        None,
        FakeController::boxed("192.168.1.50", script.clone()),
    )
}

/// Hub node plus one child per script, children named child-0, child-1, ...
pub fn hub_with_children(
    hub: &Arc<ControllerScript>,
    children: &[Arc<ControllerScript>],
) -> Vec<DeviceNode> {
    let hub_id = DeviceId::new("hub");
    let mut nodes = vec![DeviceNode::new(
        hub_id.clone(),
        "Hub",
        DeviceRole::Parent,
        None,
        FakeController::boxed("192.168.1.50", hub.clone()),
    )];
    for (index, script) in children.iter().enumerate() {
        nodes.push(DeviceNode::new(
            DeviceId::new(format!("child-{}", index)),
            format!("Child {}", index),
            DeviceRole::Child,
            Some(hub_id.clone()),
            FakeController::boxed("192.168.1.50", script.clone()),
        ));
    }
    nodes
}

pub fn hub_telemetry(children: &[&str]) -> Telemetry {
    let mut telemetry = telemetry("Hub", "1.0.0");
    telemetry.children = Some(
        children
            .iter()
            .map(|id| ChildDescriptor {
                device_id: id.to_string(),
                alias: Some(format!("Camera {}", id)),
            })
            .collect(),
    );
    telemetry
}
