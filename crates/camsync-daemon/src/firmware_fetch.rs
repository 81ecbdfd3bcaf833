//! Remote firmware manifest fetching with caching
//!
//! This module handles:
//! 1. Fetching per-model firmware manifests from the configured base URI
//! 2. Caching manifests with TTL to avoid excessive network requests
//!
//! The device model is read from the controller's telemetry, so a firmware
//! check costs one extra telemetry fetch plus at most one HTTP request per TTL.

use anyhow::{Context, Result};
use async_trait::async_trait;
use camsync_core::firmware::FirmwareManifest;
use camsync_core::{Controller, DeviceError, DeviceId, FirmwareSource};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Cache TTL for firmware manifests (5 minutes)
const MANIFEST_CACHE_TTL: Duration = Duration::from_secs(300);

/// Cached manifest entry
struct CachedManifest {
    manifest: FirmwareManifest,
    fetched_at: Instant,
}

/// Firmware source backed by `{base}/{model}/latest.json` manifests
pub struct ManifestFirmwareSource {
    client: reqwest::Client,
    base_uri: String,
    /// model -> cached manifest
    cache: RwLock<HashMap<String, CachedManifest>>,
}

impl ManifestFirmwareSource {
    pub fn new(base_uri: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_uri: base_uri.into(),
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Construct manifest URL for a model
    ///
    /// With base "https://updates.example.com/cameras" and model "C200",
    /// returns "https://updates.example.com/cameras/C200/latest.json"
    pub fn construct_manifest_url(base_uri: &str, model: &str) -> String {
        let base = base_uri.trim_end_matches('/');
        format!("{}/{}/latest.json", base, model.trim_matches('/'))
    }

    async fn cached(&self, model: &str) -> Option<FirmwareManifest> {
        let cache = self.cache.read().await;
        cache
            .get(model)
            .filter(|cached| cached.fetched_at.elapsed() < MANIFEST_CACHE_TTL)
            .map(|cached| {
                debug!(
                    model = %model,
                    age_secs = cached.fetched_at.elapsed().as_secs(),
                    "Using cached firmware manifest"
                );
                cached.manifest.clone()
            })
    }

    /// Get the manifest for a model, from cache when fresh
    pub async fn get_manifest(&self, model: &str) -> Result<FirmwareManifest, DeviceError> {
        if let Some(manifest) = self.cached(model).await {
            return Ok(manifest);
        }

        let url = Self::construct_manifest_url(&self.base_uri, model);
        debug!(url = %url, "Fetching firmware manifest");

        let response = self.client.get(&url).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Failed to fetch firmware manifest");
            DeviceError::Network(format!("{}: {}", url, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::NOT_FOUND {
                debug!(model = %model, "No firmware manifest available (404)");
            } else {
                warn!(url = %url, status = %status, "Firmware manifest fetch failed");
            }
            return Err(DeviceError::Network(format!("{} returned {}", url, status)));
        }

        let manifest: FirmwareManifest = response.json().await.map_err(|e| {
            warn!(url = %url, error = %e, "Failed to parse firmware manifest");
            DeviceError::Protocol(format!("Invalid manifest at {}: {}", url, e))
        })?;

        info!(
            model = %model,
            version = %manifest.latest.version,
            "Fetched firmware manifest"
        );

        self.cache.write().await.insert(
            model.to_string(),
            CachedManifest {
                manifest: manifest.clone(),
                fetched_at: Instant::now(),
            },
        );

        Ok(manifest)
    }
}

#[async_trait]
impl FirmwareSource for ManifestFirmwareSource {
    async fn latest_version(
        &self,
        device: &DeviceId,
        controller: &dyn Controller,
    ) -> Result<String, DeviceError> {
        let telemetry = controller.fetch_telemetry().await?;
        let model = telemetry.basic.model.ok_or_else(|| {
            DeviceError::Protocol(format!("{} does not report its model", device))
        })?;
        let manifest = self.get_manifest(&model).await?;
        Ok(manifest.latest.version)
    }
}
