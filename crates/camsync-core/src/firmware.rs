//! Firmware types for version checking
//!
//! This module provides types for:
//! - Firmware manifests published per camera model
//! - Version comparison using semver, with an exact-match fallback for
//!   vendor strings that do not parse

use serde::{Deserialize, Serialize};

/// Firmware manifest for one camera model
/// Fetched from: {manifest_uri}/{model}/latest.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmwareManifest {
    /// Camera model (e.g., "C200")
    pub model: String,
    /// Latest available release
    pub latest: FirmwareRelease,
}

/// A specific firmware release
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmwareRelease {
    /// Version string (semver format preferred)
    pub version: String,
}

/// Result of firmware version comparison
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FirmwareStatus {
    /// Device firmware is up to date
    UpToDate,
    /// Newer firmware is available
    UpdateAvailable {
        /// The latest available release
        latest_version: String,
    },
    /// Couldn't determine firmware status (version unparseable or unreported)
    Unknown,
    /// No firmware check has succeeded yet
    CheckDisabled,
}

impl Default for FirmwareStatus {
    fn default() -> Self {
        Self::CheckDisabled
    }
}

/// Compare the installed firmware version against the latest available one
///
/// Uses semver comparison as primary method. Vendor strings such as
/// "1.3.8 Build 230523 Rel.73839n" are reduced to their leading token first.
/// When either side still fails to parse, identical strings count as up to date.
pub fn compare_versions(device_version: Option<&str>, latest_version: &str) -> FirmwareStatus {
    let Some(device_version) = device_version else {
        return FirmwareStatus::Unknown;
    };

    let clean_device = clean_version_string(device_version);
    let clean_latest = clean_version_string(latest_version);

    if let (Ok(device), Ok(latest)) = (
        semver::Version::parse(clean_device),
        semver::Version::parse(clean_latest),
    ) {
        if device < latest {
            return FirmwareStatus::UpdateAvailable {
                latest_version: latest_version.to_string(),
            };
        }
        return FirmwareStatus::UpToDate;
    }

    if device_version.trim() == latest_version.trim() {
        return FirmwareStatus::UpToDate;
    }

    FirmwareStatus::Unknown
}

/// Clean a version string for semver parsing
/// Keeps the first whitespace-separated token and removes a leading v/V
fn clean_version_string(version: &str) -> &str {
    let v = version.split_whitespace().next().unwrap_or("");
    v.strip_prefix('v')
        .or_else(|| v.strip_prefix('V'))
        .unwrap_or(v)
}
