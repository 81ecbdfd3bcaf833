//! Topology graph for parent/child camera relationships
//!
//! A session holds exactly one root: either a Standalone camera, or a Parent
//! hub whose Child cameras all reference it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::device::{DeviceId, DeviceNode, DeviceRole};
use crate::error::HierarchyError;

/// A node in the topology graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyNode {
    /// Device ID
    pub id: DeviceId,
    /// Device name
    pub name: String,
    /// Role in the hierarchy
    pub role: DeviceRole,
    /// Children device IDs
    pub children: Vec<DeviceId>,
}

/// Validated device hierarchy of one session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    /// All nodes indexed by device ID
    nodes: HashMap<String, TopologyNode>,
    /// Root device ID
    root: Option<DeviceId>,
}

impl Topology {
    /// Create a new empty topology
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            root: None,
        }
    }

    /// Build and validate the topology of a session's device nodes
    pub fn from_nodes(devices: &[DeviceNode]) -> Result<Self, HierarchyError> {
        let mut topology = Self::new();

        for device in devices {
            if topology.nodes.contains_key(&device.id.0) {
                return Err(HierarchyError::Duplicate(device.id.clone()));
            }
            if device.is_root() {
                if let Some(existing) = &topology.root {
                    return Err(HierarchyError::MultipleRoots(
                        existing.clone(),
                        device.id.clone(),
                    ));
                }
                topology.root = Some(device.id.clone());
            }
            topology.add_node(TopologyNode {
                id: device.id.clone(),
                name: device.name.clone(),
                role: device.role,
                children: Vec::new(),
            });
        }

        let root = topology.root().ok_or(HierarchyError::MissingRoot)?;
        let root_id = root.id.clone();
        let root_role = root.role;

        for device in devices.iter().filter(|d| d.role == DeviceRole::Child) {
            if root_role == DeviceRole::Standalone {
                return Err(HierarchyError::StandaloneWithChildren(root_id));
            }
            if device.parent_id.as_ref() != Some(&root_id) {
                return Err(HierarchyError::DetachedChild {
                    child: device.id.clone(),
                });
            }
            topology.add_child(&root_id, &device.id);
        }

        Ok(topology)
    }

    /// Add a node to the topology
    pub fn add_node(&mut self, node: TopologyNode) {
        self.nodes.insert(node.id.0.clone(), node);
    }

    /// Add a child relationship
    pub fn add_child(&mut self, parent_id: &DeviceId, child_id: &DeviceId) {
        if let Some(parent) = self.nodes.get_mut(&parent_id.0) {
            if !parent.children.contains(child_id) {
                parent.children.push(child_id.clone());
            }
        }
    }

    /// Get the root node
    pub fn root(&self) -> Option<&TopologyNode> {
        self.root.as_ref().and_then(|id| self.nodes.get(&id.0))
    }

    /// Get children of a node
    pub fn children(&self, id: &DeviceId) -> Vec<&TopologyNode> {
        self.nodes
            .get(&id.0)
            .map(|node| {
                node.children
                    .iter()
                    .filter_map(|cid| self.nodes.get(&cid.0))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get topology as JSON-serializable structure
    pub fn to_graph(&self) -> TopologyGraph {
        TopologyGraph {
            nodes: self.nodes.values().cloned().collect(),
            root: self.root.clone(),
        }
    }
}

/// Serializable topology graph for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyGraph {
    pub nodes: Vec<TopologyNode>,
    pub root: Option<DeviceId>,
}
