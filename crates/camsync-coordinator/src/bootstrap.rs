//! Event bootstrap: attach the root to its event service and keep a live subscription
//!
//! Both steps are idempotent. A node already attached (or subscribed with a live
//! subscription) is left alone, so calling these every cycle converges once the
//! device starts answering.

use camsync_core::{
    Credentials, DeviceError, DeviceNode, DeviceRole, EventService, EventState, FeatureFlags,
    SubscriptionState,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Whether a bootstrap step changed node state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Unchanged,
    Established,
}

pub struct EventBootstrap {
    service: Arc<dyn EventService>,
    features: FeatureFlags,
}

impl EventBootstrap {
    pub fn new(service: Arc<dyn EventService>, features: FeatureFlags) -> Self {
        Self { service, features }
    }

    /// Only a standalone camera carries its own event service; hubs and the
    /// cameras behind them are never attached
    pub fn applies_to(&self, node: &DeviceNode) -> bool {
        node.role == DeviceRole::Standalone && self.features.events_enabled()
    }

    /// Discover the node's event endpoints unless already attached
    pub async fn ensure_attached(
        &self,
        node: &mut DeviceNode,
        credentials: &Credentials,
    ) -> Result<BootstrapOutcome, DeviceError> {
        if node.is_attached() {
            return Ok(BootstrapOutcome::Unchanged);
        }

        let handles = self.service.discover(credentials).await?;
        info!(
            device = %node.id,
            events = %handles.device.0,
            "Event service attached"
        );
        node.event_state = EventState::Attached(handles);
        Ok(BootstrapOutcome::Established)
    }

    /// Subscribe to motion events once attached.
    ///
    /// A subscription that reports itself dead is stopped and replaced.
    pub async fn ensure_subscribed(
        &self,
        node: &mut DeviceNode,
    ) -> Result<BootstrapOutcome, DeviceError> {
        if !self.features.motion_sensor {
            return Ok(BootstrapOutcome::Unchanged);
        }
        let handles = match &node.event_state {
            EventState::Attached(handles) => handles.clone(),
            EventState::Unattached => return Ok(BootstrapOutcome::Unchanged),
        };

        let alive = match &node.subscription_state {
            SubscriptionState::Subscribed(subscription) => Some(subscription.is_alive()),
            SubscriptionState::NotSubscribed => None,
        };
        if alive == Some(true) {
            return Ok(BootstrapOutcome::Unchanged);
        }
        if alive == Some(false) {
            warn!(device = %node.id, "Event subscription lost, renewing");
            if let Some(stale) = node.take_subscription() {
                if let Err(e) = stale.stop().await {
                    debug!(device = %node.id, error = %e, "Stopping stale subscription failed");
                }
            }
        }

        let subscription = self.service.subscribe(&handles).await?;
        node.subscription_state = SubscriptionState::Subscribed(subscription);
        info!(device = %node.id, "Subscribed to motion events");
        Ok(BootstrapOutcome::Established)
    }

    /// Stop any subscription and forget the event endpoints
    pub async fn detach(&self, node: &mut DeviceNode) {
        if let Some(subscription) = node.take_subscription() {
            if let Err(e) = subscription.stop().await {
                warn!(device = %node.id, error = %e, "Failed to stop event subscription");
            }
        }
        node.event_state = EventState::Unattached;
    }
}
