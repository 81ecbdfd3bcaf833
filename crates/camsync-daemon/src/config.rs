//! Configuration loading, migration and validation

use anyhow::{Context, Result};
use camsync_core::{Credentials, FeatureFlags, MaintenancePolicy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Schema version written by this build
pub const CONFIG_VERSION: u32 = 4;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("Invalid configuration version: {0}")]
    InvalidVersion(String),
    #[error("Malformed configuration: {0}")]
    Malformed(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub features: FeatureFlags,
    #[serde(default)]
    pub maintenance: MaintenancePolicy,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub firmware: FirmwareConfig,
    #[serde(default, rename = "camera")]
    pub cameras: Vec<CameraConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            daemon: DaemonConfig::default(),
            features: FeatureFlags::default(),
            maintenance: MaintenancePolicy::default(),
            media: MediaConfig::default(),
            firmware: FirmwareConfig::default(),
            cameras: Vec::new(),
        }
    }
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for web server
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Seconds between coordinator cycles
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,
    /// TLS configuration (optional - enables HTTPS when present)
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cycle_interval_secs: default_cycle_interval(),
            tls: None,
        }
    }
}

/// TLS/HTTPS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM format)
    pub cert: String,
    /// Path to private key file (PEM format)
    pub key: String,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_cycle_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Directory holding one subdirectory of recordings per device
    #[serde(default = "default_media_path")]
    pub path: String,
    /// Files older than this are removed on cleanup
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            path: default_media_path(),
            retention_secs: default_retention(),
        }
    }
}

fn default_media_path() -> String {
    "./media".to_string()
}

fn default_retention() -> u64 {
    7 * 86_400
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FirmwareConfig {
    /// Base URI of per-model firmware manifests; unset uses the simulated source
    #[serde(default)]
    pub manifest_uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    /// Cloud account password; empty means local credentials are used
    #[serde(default)]
    pub cloud_password: String,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl CameraConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.host, &self.username, &self.password)
            .with_cloud_password(self.cloud_password.clone())
    }
}

/// Behaviour of the simulated device behind a camera entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of child cameras; any makes the device a hub
    #[serde(default)]
    pub children: usize,
    /// Installed firmware version
    #[serde(default = "default_sim_firmware")]
    pub firmware: String,
    /// Version reported by the simulated update server
    #[serde(default = "default_sim_firmware")]
    pub latest_firmware: String,
    /// Every Nth telemetry fetch fails (0 never fails)
    #[serde(default)]
    pub telemetry_fail_every: u64,
    /// Event discovery fails this many times before succeeding
    #[serde(default)]
    pub discovery_failures: u32,
    /// Registration is refused with an auth error
    #[serde(default)]
    pub reject_auth: bool,
    /// Device clock minus host clock, in seconds
    #[serde(default)]
    pub clock_offset_secs: i64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            children: 0,
            firmware: default_sim_firmware(),
            latest_firmware: default_sim_firmware(),
            telemetry_fail_every: 0,
            discovery_failures: 0,
            reject_auth: false,
            clock_offset_secs: 0,
        }
    }
}

fn default_sim_firmware() -> String {
    "1.0.0".to_string()
}

/// Bring a raw configuration document up to [`CONFIG_VERSION`].
///
/// Each step only fills in keys that are absent, so explicit settings survive.
/// A document without a version is taken to be current.
pub fn migrate(mut value: toml::Value) -> Result<toml::Value, ConfigError> {
    let root = value
        .as_table_mut()
        .ok_or_else(|| ConfigError::Malformed("top level must be a table".into()))?;

    let mut version = match root.get("version") {
        None => CONFIG_VERSION,
        Some(toml::Value::Integer(v)) => u32::try_from(*v)
            .ok()
            .filter(|v| *v >= 1)
            .ok_or_else(|| ConfigError::InvalidVersion(v.to_string()))?,
        Some(other) => return Err(ConfigError::InvalidVersion(other.to_string())),
    };

    if version > CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion {
            found: version,
            supported: CONFIG_VERSION,
        });
    }

    while version < CONFIG_VERSION {
        match version {
            1 => {
                set_feature_default(root, "motion_sensor", true)?;
                if let Some(toml::Value::Array(cameras)) = root.get_mut("camera") {
                    for camera in cameras.iter_mut().filter_map(toml::Value::as_table_mut) {
                        camera
                            .entry("cloud_password")
                            .or_insert_with(|| toml::Value::String(String::new()));
                    }
                }
            }
            2 => set_feature_default(root, "time_sync", false)?,
            3 => set_feature_default(root, "sound_detection", false)?,
            _ => {}
        }
        version += 1;
        info!(version, "Migrated configuration");
    }

    root.insert("version".into(), toml::Value::Integer(i64::from(CONFIG_VERSION)));
    Ok(value)
}

fn set_feature_default(
    root: &mut toml::map::Map<String, toml::Value>,
    key: &str,
    default: bool,
) -> Result<(), ConfigError> {
    let features = root
        .entry("features")
        .or_insert_with(|| toml::Value::Table(Default::default()))
        .as_table_mut()
        .ok_or_else(|| ConfigError::Malformed("[features] must be a table".into()))?;
    features
        .entry(key)
        .or_insert(toml::Value::Boolean(default));
    Ok(())
}

/// Parse and migrate configuration text
pub fn parse_config(content: &str) -> Result<Config> {
    let raw: toml::Value = toml::from_str(content).context("Invalid TOML")?;
    let migrated = migrate(raw)?;
    let config: Config = migrated
        .try_into()
        .context("Configuration does not match the expected schema")?;
    Ok(config)
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = parse_config(&content)?;
        info!(path = %path.display(), cameras = config.cameras.len(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = parse_config(
            r#"
            [[camera]]
            host = "192.168.1.50"
            username = "operator"
            password = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.version, CONFIG_VERSION);
        assert_eq!(config.daemon.bind, "0.0.0.0:8080");
        assert_eq!(config.maintenance, MaintenancePolicy::default());
        assert_eq!(config.features, FeatureFlags::default());
        assert_eq!(config.cameras[0].simulation.children, 0);
        assert_eq!(config.cameras[0].credentials().cloud_password, None);
    }

    #[test]
    fn test_migrates_version_one() {
        let config = parse_config(
            r#"
            version = 1

            [[camera]]
            host = "10.0.0.9"
            username = "operator"
            password = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.version, CONFIG_VERSION);
        assert!(config.features.motion_sensor);
        assert!(!config.features.time_sync);
        assert!(!config.features.sound_detection);
        assert_eq!(config.cameras[0].cloud_password, "");
    }

    #[test]
    fn test_migration_keeps_explicit_settings() {
        let config = parse_config(
            r#"
            version = 2

            [features]
            motion_sensor = false
            time_sync = true
            "#,
        )
        .unwrap();

        assert!(!config.features.motion_sensor);
        assert!(config.features.time_sync);
    }

    #[test]
    fn test_rejects_future_version() {
        let raw: toml::Value = toml::from_str("version = 99").unwrap();
        let err = migrate(raw).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnsupportedVersion { found: 99, supported: CONFIG_VERSION }
        ));
    }

    #[test]
    fn test_rejects_non_integer_version() {
        let raw: toml::Value = toml::from_str("version = \"two\"").unwrap();
        assert!(matches!(migrate(raw), Err(ConfigError::InvalidVersion(_))));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("camsync.toml")).unwrap();
        assert!(config.cameras.is_empty());
        assert_eq!(config.daemon.cycle_interval_secs, 30);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camsync.toml");
        std::fs::write(
            &path,
            r#"
            [daemon]
            cycle_interval_secs = 5

            [maintenance]
            time_sync_period_secs = 600

            [[camera]]
            host = "10.0.0.9"
            username = "operator"
            password = "secret"
            cloud_password = "cloud"

            [camera.simulation]
            children = 2
            discovery_failures = 1
            "#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.daemon.cycle_interval_secs, 5);
        assert_eq!(config.maintenance.time_sync_period_secs, 600);
        assert_eq!(config.maintenance.media_cleanup_period_secs, 3_600);
        assert_eq!(config.cameras[0].simulation.children, 2);
        assert_eq!(
            config.cameras[0].credentials().controller_login(),
            ("admin", "cloud")
        );
    }
}
