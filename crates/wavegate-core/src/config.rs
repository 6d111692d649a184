//! Runtime configuration for the discovery pipeline.
//!
//! The configuration is shared, read-mostly state: background tasks read a
//! snapshot at the top of each tick, so an update takes effect on the next
//! scheduled cycle rather than mid-cycle.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Default values for the discovery configuration.
pub mod defaults {
    /// Shallow scan cadence in seconds
    pub const SCAN_INTERVAL_SECS: u64 = 30;
    /// Deep scan cadence in seconds
    pub const DEEP_SCAN_INTERVAL_SECS: u64 = 300;
    /// Health-monitor sweep cadence in seconds
    pub const HEALTH_CHECK_INTERVAL_SECS: u64 = 60;
    /// Stale-record cleanup cadence in seconds
    pub const CLEANUP_INTERVAL_SECS: u64 = 3600;
    /// Hours a pending device waits before it is auto-rejected
    pub const PENDING_TIMEOUT_HOURS: i64 = 24;
    /// Hours an unsighted discovered record (or a rejected record) is kept
    pub const RETENTION_HOURS: i64 = 24;
    /// Timeout for a single protocol scan call, in milliseconds
    pub const SCAN_CALL_TIMEOUT_MS: u64 = 10_000;
    /// Timeout for an integration attempt, in milliseconds
    pub const INTEGRATION_TIMEOUT_MS: u64 = 15_000;
    /// Timeout for a health check or repair call, in milliseconds
    pub const HEALTH_CALL_TIMEOUT_MS: u64 = 5_000;
}

/// Minimum security level the platform requires of new devices.
///
/// Compared against the band the security validator assigns to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MinimumSecurityLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl std::fmt::Display for MinimumSecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Discovery pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Whether compatible devices may be integrated without operator approval
    pub auto_integration_enabled: bool,
    /// Minimum security band required for integration
    pub security_level: MinimumSecurityLevel,
    /// Shallow scan cadence in seconds
    pub scan_interval_secs: u64,
    /// Deep scan cadence in seconds
    pub deep_scan_interval_secs: u64,
    /// Health-monitor sweep cadence in seconds
    pub health_check_interval_secs: u64,
    /// Stale-record cleanup cadence in seconds
    pub cleanup_interval_secs: u64,
    /// Hours before a pending device is auto-rejected
    pub pending_timeout_hours: i64,
    /// Hours before an unsighted or rejected record is evicted
    pub retention_hours: i64,
    /// Per-protocol scan call timeout in milliseconds
    pub scan_call_timeout_ms: u64,
    /// Integration attempt timeout in milliseconds
    pub integration_timeout_ms: u64,
    /// Health check / repair call timeout in milliseconds
    pub health_call_timeout_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            auto_integration_enabled: true,
            security_level: MinimumSecurityLevel::Medium,
            scan_interval_secs: defaults::SCAN_INTERVAL_SECS,
            deep_scan_interval_secs: defaults::DEEP_SCAN_INTERVAL_SECS,
            health_check_interval_secs: defaults::HEALTH_CHECK_INTERVAL_SECS,
            cleanup_interval_secs: defaults::CLEANUP_INTERVAL_SECS,
            pending_timeout_hours: defaults::PENDING_TIMEOUT_HOURS,
            retention_hours: defaults::RETENTION_HOURS,
            scan_call_timeout_ms: defaults::SCAN_CALL_TIMEOUT_MS,
            integration_timeout_ms: defaults::INTEGRATION_TIMEOUT_MS,
            health_call_timeout_ms: defaults::HEALTH_CALL_TIMEOUT_MS,
        }
    }
}

impl DiscoveryConfig {
    pub fn pending_timeout(&self) -> Duration {
        Duration::hours(self.pending_timeout_hours)
    }

    pub fn retention(&self) -> Duration {
        Duration::hours(self.retention_hours)
    }

    /// Apply a partial update, leaving unset fields untouched.
    pub fn apply(&mut self, patch: &ConfigPatch) {
        if let Some(enabled) = patch.auto_integration_enabled {
            self.auto_integration_enabled = enabled;
        }
        if let Some(level) = patch.security_level {
            self.security_level = level;
        }
        if let Some(secs) = patch.scan_interval_secs {
            self.scan_interval_secs = secs.max(1);
        }
        if let Some(secs) = patch.deep_scan_interval_secs {
            self.deep_scan_interval_secs = secs.max(1);
        }
    }
}

/// Recognized options for a runtime configuration update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_integration_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_level: Option<MinimumSecurityLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_scan_interval_secs: Option<u64>,
}
