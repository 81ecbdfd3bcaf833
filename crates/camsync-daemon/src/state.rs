//! Application state management

use anyhow::Result;
use camsync_coordinator::{
    Collaborators, CycleReport, CycleRunner, RunnerHandle, Session, SessionId, SyncCoordinator,
    SyncEvent,
};
use camsync_core::{DeviceId, FirmwareSource, NodeSnapshot, Observer, Telemetry, TopologyGraph};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::firmware_fetch::ManifestFirmwareSource;
use crate::media::MediaRetention;
use crate::observer::ObserverRegistry;
use crate::sim::SimulatedBackend;

/// One registered camera host and its coordinator
pub struct SessionEntry {
    pub id: SessionId,
    pub host: String,
    pub coordinator: Arc<Mutex<SyncCoordinator>>,
}

/// Session summary served by the API
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: SessionId,
    pub host: String,
    pub closed: bool,
    pub nodes: Vec<NodeSnapshot>,
    pub topology: TopologyGraph,
    pub observers: Vec<ObserverView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObserverView {
    pub device: DeviceId,
    pub enabled: bool,
    pub listening: bool,
    pub latest: Option<Telemetry>,
}

/// Shared application state
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// Sessions registered at startup
    sessions: Vec<SessionEntry>,
    /// Last cycle report per session
    reports: RwLock<HashMap<SessionId, CycleReport>>,
    /// Running periodic triggers
    runners: Mutex<Vec<(RunnerHandle, JoinHandle<()>)>>,
    /// Telemetry observers
    pub observers: ObserverRegistry,
    /// Cycle events for WebSocket clients
    pub events: broadcast::Sender<SyncEvent>,
}

impl AppState {
    /// Register every configured camera and build its coordinator.
    ///
    /// A camera whose registration fails is logged and left out.
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let backend = Arc::new(SimulatedBackend::new(&config.cameras));
        let firmware: Arc<dyn FirmwareSource> = match &config.firmware.manifest_uri {
            Some(uri) => Arc::new(ManifestFirmwareSource::new(uri.clone())?),
            None => backend.clone(),
        };
        let collaborators = Collaborators {
            events: backend.clone(),
            media: Arc::new(MediaRetention::new(
                &config.media.path,
                Duration::from_secs(config.media.retention_secs),
            )),
            firmware,
        };

        let (events, _) = broadcast::channel(100);
        let (updates, _) = broadcast::channel(100);
        let observers = ObserverRegistry::new(updates);

        let mut sessions = Vec::new();
        for camera in &config.cameras {
            let now = Utc::now().timestamp();
            let attached = Session::attach(backend.as_ref(), camera.credentials(), now).await;
            let mut session = match attached {
                Ok(session) => session,
                Err(e) => {
                    error!(host = %camera.host, error = %e, "Camera registration failed");
                    continue;
                }
            };

            let devices: Vec<_> = session
                .nodes()
                .iter()
                .map(|node| (node.id.clone(), node.is_root()))
                .collect();
            for (device, is_root) in devices {
                let sound = is_root && config.features.sound_detection;
                session.add_observer(observers.observe(&device, sound));
            }

            let id = session.id();
            let coordinator = SyncCoordinator::new(
                session,
                collaborators.clone(),
                config.features,
                config.maintenance,
            );
            sessions.push(SessionEntry {
                id,
                host: camera.host.clone(),
                coordinator: Arc::new(Mutex::new(coordinator)),
            });
        }

        info!(
            sessions = sessions.len(),
            configured = config.cameras.len(),
            "Sessions registered"
        );

        let state = Arc::new(Self {
            config,
            sessions,
            reports: RwLock::new(HashMap::new()),
            runners: Mutex::new(Vec::new()),
            observers,
            events,
        });

        // Keep the last report of every session, whoever ran the cycle
        let state_clone = state.clone();
        let mut rx = state.events.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(SyncEvent::CycleCompleted { session, report }) => {
                        state_clone.reports.write().await.insert(session, report);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(skipped = n, "Report channel lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(state)
    }

    pub fn session(&self, id: SessionId) -> Option<&SessionEntry> {
        self.sessions.iter().find(|entry| entry.id == id)
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|entry| entry.id).collect()
    }

    /// Current view of every session
    pub async fn sessions(&self) -> Vec<SessionView> {
        let mut views = Vec::with_capacity(self.sessions.len());
        for entry in &self.sessions {
            let coordinator = entry.coordinator.lock().await;
            let session = coordinator.session();
            let observers = session
                .nodes()
                .iter()
                .filter_map(|node| self.observers.get(&node.id))
                .map(|observer| ObserverView {
                    device: observer.device_id().clone(),
                    enabled: observer.is_active(),
                    listening: observer.is_listening(),
                    latest: observer.latest(),
                })
                .collect();
            views.push(SessionView {
                id: entry.id,
                host: entry.host.clone(),
                closed: session.is_closed(),
                nodes: session.snapshots(),
                topology: session.topology().to_graph(),
                observers,
            });
        }
        views
    }

    pub async fn report(&self, id: SessionId) -> Option<CycleReport> {
        self.reports.read().await.get(&id).cloned()
    }

    /// Run one cycle now, waiting for any cycle already in flight
    pub async fn run_cycle(&self, id: SessionId) -> Option<CycleReport> {
        let entry = self.session(id)?;
        let report = entry.coordinator.lock().await.run_cycle().await;
        self.reports.write().await.insert(id, report.clone());
        let _ = self.events.send(SyncEvent::CycleCompleted {
            session: id,
            report: report.clone(),
        });
        Some(report)
    }

    /// Start one periodic runner per session
    pub async fn start_runners(&self, interval: Duration) {
        let mut runners = self.runners.lock().await;
        for entry in &self.sessions {
            let (runner, handle) =
                CycleRunner::new(entry.coordinator.clone(), interval, self.events.clone());
            runners.push((handle, tokio::spawn(runner.run())));
        }
        info!(runners = runners.len(), interval_secs = interval.as_secs(), "Cycle runners started");
    }

    /// Stop runners (each tears down its session) and tear down the rest
    pub async fn shutdown(&self) {
        let runners: Vec<_> = self.runners.lock().await.drain(..).collect();
        for (handle, _) in &runners {
            handle.shutdown();
        }
        for (_, task) in runners {
            if let Err(e) = task.await {
                error!(error = %e, "Cycle runner task failed");
            }
        }
        for entry in &self.sessions {
            entry.coordinator.lock().await.teardown().await;
        }
        info!("All sessions torn down");
    }
}
