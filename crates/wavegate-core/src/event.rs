//! Events emitted by the discovery and onboarding pipeline.
//!
//! Components never call each other's listeners directly; every observable
//! state change is published as a [`WavegateEvent`] on the event bus and
//! consumers subscribe to what they care about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Compact device view carried in event payloads.
///
/// Events cross crate boundaries, so they carry a summary rather than the
/// full device record owned by the discovery store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSummary {
    /// Deterministic device id
    pub device_id: String,
    /// Human-readable name
    pub name: String,
    /// Device type (e.g. "sensor", "security_camera")
    pub device_type: String,
    /// Transport protocol (e.g. "zigbee", "wifi")
    pub protocol: String,
    /// Manufacturer, or "unknown"
    pub manufacturer: String,
}

/// Which scan cadence produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    /// Frequent shallow scan
    Shallow,
    /// Infrequent deep scan (includes traffic analysis)
    Deep,
    /// Operator-triggered scan
    Manual,
}

impl std::fmt::Display for ScanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shallow => write!(f, "shallow"),
            Self::Deep => write!(f, "deep"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// All events published by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WavegateEvent {
    /// A device with a novel id was sighted for the first time.
    DeviceDiscovered { device: DeviceSummary },
    /// A compatible device is waiting for operator approval.
    DevicePendingApproval {
        device: DeviceSummary,
        compatibility_score: u8,
    },
    /// Policy placed a device in quarantine before integration.
    DeviceQuarantined {
        device: DeviceSummary,
        quarantine_secs: i64,
        reason: String,
    },
    /// A device was rejected (scoring, policy, timeout or operator).
    DeviceRejected { device: DeviceSummary, reason: String },
    /// A device completed integration.
    DeviceIntegrated { device: DeviceSummary },
    /// An integration attempt failed; the device returns to discovered.
    IntegrationFailed { device: DeviceSummary, error: String },
    /// A scan cycle finished.
    ScanCompleted {
        scan_type: ScanType,
        duration_ms: u64,
        devices_found: usize,
    },
    /// An integrated device failed its health check and could not be repaired.
    DeviceUnreachable { device: DeviceSummary, issue: String },
}

impl WavegateEvent {
    /// Short name used for logging and filtering.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeviceDiscovered { .. } => "device_discovered",
            Self::DevicePendingApproval { .. } => "device_pending_approval",
            Self::DeviceQuarantined { .. } => "device_quarantined",
            Self::DeviceRejected { .. } => "device_rejected",
            Self::DeviceIntegrated { .. } => "device_integrated",
            Self::IntegrationFailed { .. } => "integration_failed",
            Self::ScanCompleted { .. } => "scan_completed",
            Self::DeviceUnreachable { .. } => "device_unreachable",
        }
    }

    /// Device id the event concerns, if any.
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::DeviceDiscovered { device }
            | Self::DevicePendingApproval { device, .. }
            | Self::DeviceQuarantined { device, .. }
            | Self::DeviceRejected { device, .. }
            | Self::DeviceIntegrated { device }
            | Self::IntegrationFailed { device, .. }
            | Self::DeviceUnreachable { device, .. } => Some(&device.device_id),
            Self::ScanCompleted { .. } => None,
        }
    }
}

/// Metadata attached to every published event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event id
    pub id: Uuid,
    /// Publication timestamp
    pub timestamp: DateTime<Utc>,
    /// Component that published the event
    pub source: String,
}

impl EventMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> DeviceSummary {
        DeviceSummary {
            device_id: "dev-1234".to_string(),
            name: "Hall Sensor".to_string(),
            device_type: "sensor".to_string(),
            protocol: "zigbee".to_string(),
            manufacturer: "acme".to_string(),
        }
    }

    #[test]
    fn test_event_names() {
        let ev = WavegateEvent::DeviceDiscovered { device: summary() };
        assert_eq!(ev.name(), "device_discovered");
        assert_eq!(ev.device_id(), Some("dev-1234"));

        let ev = WavegateEvent::ScanCompleted {
            scan_type: ScanType::Deep,
            duration_ms: 12,
            devices_found: 3,
        };
        assert_eq!(ev.name(), "scan_completed");
        assert_eq!(ev.device_id(), None);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let ev = WavegateEvent::DeviceRejected {
            device: summary(),
            reason: "timeout".to_string(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "device_rejected");
        assert_eq!(json["reason"], "timeout");
    }
}
