//! Error taxonomy shared by the coordinator and its collaborators

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::DeviceId;

/// Coarse classification of a failure, used in cycle reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Credentials rejected (fatal at registration)
    Auth,
    /// Device unreachable or request timed out
    Network,
    /// Event service could not be discovered
    Discovery,
    /// Event subscription could not be established
    Subscription,
    /// Device answered with something we could not interpret
    Protocol,
    /// Invalid configuration
    Config,
}

impl ErrorKind {
    /// Whether the next cycle is expected to retry this failure on its own
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Discovery | Self::Subscription | Self::Protocol
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Auth => "auth",
            Self::Network => "network",
            Self::Discovery => "discovery",
            Self::Subscription => "subscription",
            Self::Protocol => "protocol",
            Self::Config => "config",
        };
        f.write_str(name)
    }
}

/// Failure reported by an external collaborator (controller, event service, ...)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Authentication rejected: {0}")]
    Auth(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Event service discovery failed: {0}")]
    Discovery(String),
    #[error("Event subscription failed: {0}")]
    Subscription(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl DeviceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::Network(_) => ErrorKind::Network,
            Self::Discovery(_) => ErrorKind::Discovery,
            Self::Subscription(_) => ErrorKind::Subscription,
            Self::Protocol(_) => ErrorKind::Protocol,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Violations of the parent/child hierarchy invariant
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("Hierarchy has no root device")]
    MissingRoot,
    #[error("Hierarchy has more than one root device: {0} and {1}")]
    MultipleRoots(DeviceId, DeviceId),
    #[error("Standalone device {0} cannot have children")]
    StandaloneWithChildren(DeviceId),
    #[error("Child device {child} does not reference the parent device")]
    DetachedChild { child: DeviceId },
    #[error("Duplicate device id {0}")]
    Duplicate(DeviceId),
}
