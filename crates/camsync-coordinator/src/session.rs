//! Session: the device hierarchy registered for one camera host
//!
//! A session is created once from the host's credentials, owns every
//! [`DeviceNode`] and the observers attached to them, and lives until teardown.
//! Registration failures propagate to the caller; nothing in a session is
//! rebuilt mid-flight.

use crate::bootstrap::EventBootstrap;
use camsync_core::{
    Controller, ControllerRegistrar, Credentials, DeviceError, DeviceId, DeviceNode, DeviceRole,
    HierarchyError, NodeSnapshot, Observer, Telemetry, Topology,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Identifier of a synchronization session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to register controller for {host}: {source}")]
    Registration {
        host: String,
        #[source]
        source: DeviceError,
    },
    #[error("Failed to read initial state of {device}: {source}")]
    InitialFetch {
        device: String,
        #[source]
        source: DeviceError,
    },
    #[error("Invalid device hierarchy: {0}")]
    Hierarchy(#[from] HierarchyError),
}

impl SessionError {
    /// The underlying device failure, if any
    pub fn device_error(&self) -> Option<&DeviceError> {
        match self {
            Self::Registration { source, .. } | Self::InitialFetch { source, .. } => Some(source),
            Self::Hierarchy(_) => None,
        }
    }
}

/// A validated hierarchy of device nodes; the root is always at index 0.
///
/// Teardown releases every node, so a closed session has no root.
pub struct Session {
    id: SessionId,
    credentials: Credentials,
    nodes: Vec<DeviceNode>,
    observers: Vec<Arc<dyn Observer>>,
    closed: bool,
}

impl Session {
    /// Register the root controller and any children it reports
    pub async fn attach(
        registrar: &dyn ControllerRegistrar,
        credentials: Credentials,
        now: i64,
    ) -> Result<Self, SessionError> {
        let host = credentials.host.clone();
        let (user, secret) = credentials.controller_login();
        info!(host = %host, user = %user, "Registering controller");

        let controller = registrar
            .register(&host, user, secret, None)
            .await
            .map_err(|source| SessionError::Registration {
                host: host.clone(),
                source,
            })?;

        let telemetry = initial_fetch(controller.as_ref(), &host).await?;
        let device_clock = controller
            .fetch_clock()
            .await
            .map_err(|source| SessionError::InitialFetch {
                device: host.clone(),
                source,
            })?;

        let root_id = telemetry
            .basic
            .serial
            .clone()
            .map(DeviceId)
            .unwrap_or_else(|| DeviceId::from_host(&host, 0));
        let root_name = telemetry
            .basic
            .alias
            .clone()
            .unwrap_or_else(|| host.clone());
        let role = if telemetry.is_hub() {
            DeviceRole::Parent
        } else {
            DeviceRole::Standalone
        };
        let children = telemetry.children.clone().unwrap_or_default();

        let mut root = DeviceNode::new(root_id.clone(), root_name, role, None, controller);
        root.timezone_offset_secs = device_clock - now;
        root.telemetry = Some(telemetry);
        debug!(
            device = %root_id,
            offset_secs = root.timezone_offset_secs,
            "Computed device clock offset"
        );

        let mut nodes = vec![root];
        for (index, child) in children.iter().enumerate() {
            let controller = registrar
                .register(&host, "admin", credentials.child_secret(), Some(&child.device_id))
                .await
                .map_err(|source| SessionError::Registration {
                    host: format!("{} (child {})", host, child.device_id),
                    source,
                })?;
            let child_telemetry = initial_fetch(controller.as_ref(), &child.device_id).await?;
            let name = child
                .alias
                .clone()
                .or_else(|| child_telemetry.basic.alias.clone())
                .unwrap_or_else(|| DeviceId::from_host(&host, index + 1).0);

            let mut node = DeviceNode::new(
                DeviceId::new(child.device_id.clone()),
                name,
                DeviceRole::Child,
                Some(root_id.clone()),
                controller,
            );
            node.telemetry = Some(child_telemetry);
            nodes.push(node);
        }

        let session = Self::from_nodes(credentials, nodes)?;
        info!(
            session = %session.id,
            host = %host,
            role = ?role,
            children = session.nodes.len() - 1,
            "Session attached"
        );
        Ok(session)
    }

    /// Build a session from already registered nodes, validating the hierarchy
    pub fn from_nodes(
        credentials: Credentials,
        mut nodes: Vec<DeviceNode>,
    ) -> Result<Self, SessionError> {
        Topology::from_nodes(&nodes)?;
        if let Some(root_index) = nodes.iter().position(DeviceNode::is_root) {
            nodes.swap(0, root_index);
        }
        Ok(Self {
            id: SessionId::new(),
            credentials,
            nodes,
            observers: Vec::new(),
            closed: false,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The Standalone or Parent device, `None` once torn down
    pub fn root(&self) -> Option<&DeviceNode> {
        self.nodes.first()
    }

    pub fn root_mut(&mut self) -> Option<&mut DeviceNode> {
        self.nodes.first_mut()
    }

    /// Child devices (empty for a standalone camera)
    pub fn children(&self) -> &[DeviceNode] {
        self.nodes.get(1..).unwrap_or_default()
    }

    /// All nodes, root first
    pub fn nodes(&self) -> &[DeviceNode] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [DeviceNode] {
        &mut self.nodes
    }

    pub fn node(&self, id: &DeviceId) -> Option<&DeviceNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn topology(&self) -> Topology {
        // Validated on construction and the node set never changes afterwards
        Topology::from_nodes(&self.nodes).unwrap_or_default()
    }

    pub fn snapshots(&self) -> Vec<NodeSnapshot> {
        self.nodes.iter().map(DeviceNode::snapshot).collect()
    }

    pub fn add_observer(&mut self, observer: Arc<dyn Observer>) {
        debug!(session = %self.id, device = %observer.device_id(), "Observer attached");
        self.observers.push(observer);
    }

    pub fn observers(&self) -> &[Arc<dyn Observer>] {
        &self.observers
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Detach the root's event service, release every controller and observer,
    /// and close the session.
    pub async fn teardown(&mut self, bootstrap: &EventBootstrap) {
        if self.closed {
            return;
        }
        if let Some(root) = self.root_mut() {
            bootstrap.detach(root).await;
        }
        let released = self.nodes.len();
        self.nodes.clear();
        self.observers.clear();
        self.closed = true;
        info!(
            session = %self.id,
            host = %self.credentials.host,
            released,
            "Session torn down"
        );
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("host", &self.credentials.host)
            .field("nodes", &self.nodes)
            .field("observers", &self.observers.len())
            .field("closed", &self.closed)
            .finish()
    }
}

async fn initial_fetch(
    controller: &dyn Controller,
    device: &str,
) -> Result<Telemetry, SessionError> {
    controller
        .fetch_telemetry()
        .await
        .map_err(|source| SessionError::InitialFetch {
            device: device.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::*;
    use camsync_core::ErrorKind;

    fn registrar_with(
        root: Telemetry,
        children: &[(&str, Telemetry)],
    ) -> FakeRegistrar {
        let mut registrar = FakeRegistrar::default();
        let root_script = ControllerScript::new(root);
        *root_script.clock.lock().unwrap() = 1_000_120;
        registrar.scripts.insert(None, root_script);
        for (id, telemetry) in children {
            registrar
                .scripts
                .insert(Some(id.to_string()), ControllerScript::new(telemetry.clone()));
        }
        registrar
    }

    #[tokio::test]
    async fn test_attach_standalone_camera() {
        let registrar = registrar_with(telemetry("Front door", "1.0.0"), &[]);
        let session = Session::attach(&registrar, credentials(), 1_000_000)
            .await
            .unwrap();

        assert_eq!(session.root().unwrap().role, DeviceRole::Standalone);
        assert_eq!(session.root().unwrap().name, "Front door");
        assert_eq!(session.root().unwrap().id, DeviceId::from_host("192.168.1.50", 0));
        assert_eq!(session.root().unwrap().timezone_offset_secs, 120);
        assert!(session.children().is_empty());
        assert_eq!(session.root().unwrap().last_time_sync, 0);
    }

    #[tokio::test]
    async fn test_attach_hub_registers_children_with_cloud_password() {
        let registrar = registrar_with(
            hub_telemetry(&["c1", "c2"]),
            &[
                ("c1", telemetry("Garage", "1.0.0")),
                ("c2", telemetry("Yard", "1.1.0")),
            ],
        );
        let creds = credentials().with_cloud_password("cloud-secret");
        let session = Session::attach(&registrar, creds, 1_000_000).await.unwrap();

        assert_eq!(session.root().unwrap().role, DeviceRole::Parent);
        assert_eq!(session.children().len(), 2);
        let root_id = session.root().unwrap().id.clone();
        assert!(session
            .children()
            .iter()
            .all(|c| c.role == DeviceRole::Child && c.parent_id.as_ref() == Some(&root_id)));
        assert_eq!(session.children()[0].name, "Camera c1");

        let logins = registrar.logins.lock().unwrap().clone();
        assert_eq!(logins[0], ("admin".into(), "cloud-secret".into(), None));
        assert_eq!(
            logins[1],
            ("admin".into(), "cloud-secret".into(), Some("c1".into()))
        );
    }

    #[tokio::test]
    async fn test_auth_failure_propagates() {
        let mut registrar = registrar_with(telemetry("Front door", "1.0.0"), &[]);
        registrar.reject_auth = true;

        let err = Session::attach(&registrar, credentials(), 0).await.unwrap_err();
        assert_eq!(err.device_error().map(DeviceError::kind), Some(ErrorKind::Auth));
    }

    #[tokio::test]
    async fn test_initial_fetch_failure_propagates() {
        let registrar = registrar_with(telemetry("Front door", "1.0.0"), &[]);
        registrar.scripts[&None].set_failing(true);

        let err = Session::attach(&registrar, credentials(), 0).await.unwrap_err();
        assert!(matches!(err, SessionError::InitialFetch { .. }));
    }

    #[test]
    fn test_from_nodes_moves_root_first() {
        let hub = ControllerScript::new(telemetry("Hub", "1.0.0"));
        let child = ControllerScript::new(telemetry("Cam", "1.0.0"));
        let mut nodes = hub_with_children(&hub, &[child]);
        nodes.reverse();

        let session = Session::from_nodes(credentials(), nodes).unwrap();
        assert_eq!(session.root().unwrap().id, DeviceId::new("hub"));
        assert_eq!(session.children().len(), 1);
        assert_eq!(session.snapshots().len(), 2);
    }

    #[tokio::test]
    async fn test_teardown_detaches_and_releases_once() {
        let service = FakeEventService::new();
        let bootstrap = EventBootstrap::new(
            service.clone(),
            camsync_core::FeatureFlags {
                motion_sensor: true,
                ..Default::default()
            },
        );
        let script = ControllerScript::new(telemetry("Front door", "1.0.0"));
        let mut session = Session::from_nodes(credentials(), vec![standalone(&script)]).unwrap();
        bootstrap
            .ensure_attached(session.root_mut().unwrap(), &credentials())
            .await
            .unwrap();
        bootstrap.ensure_subscribed(session.root_mut().unwrap()).await.unwrap();

        assert_eq!(Arc::strong_count(&script), 2);

        session.teardown(&bootstrap).await;
        session.teardown(&bootstrap).await;

        assert!(session.is_closed());
        assert!(session.root().is_none());
        assert!(session.nodes().is_empty());
        assert_eq!(Arc::strong_count(&script), 1);
        assert_eq!(service.stops.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_nodes_rejects_invalid_hierarchy() {
        let err = Session::from_nodes(credentials(), Vec::new()).unwrap_err();
        assert!(matches!(err, SessionError::Hierarchy(HierarchyError::MissingRoot)));
    }
}
