//! Device records and the raw descriptors scans produce.
//!
//! A [`RawDescriptor`] is what a protocol driver reports for one sighting.
//! A [`DeviceRecord`] is the pipeline's view of one physically distinct
//! device, keyed by a deterministic id so repeat sightings collapse onto
//! the same record.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Wireless protocols the pipeline scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Wifi,
    Ble,
    Zigbee,
    Zwave,
    Thread,
    Matter,
}

impl Protocol {
    /// Mesh protocols carry network-layer security and earn a higher
    /// baseline credit in security scoring.
    pub fn is_mesh(&self) -> bool {
        matches!(self, Self::Zigbee | Self::Zwave | Self::Thread)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wifi => "wifi",
            Self::Ble => "ble",
            Self::Zigbee => "zigbee",
            Self::Zwave => "zwave",
            Self::Thread => "thread",
            Self::Matter => "matter",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Device type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Sensor,
    SmartLight,
    SmartPlug,
    Thermostat,
    SecurityCamera,
    SmartLock,
    SmartSpeaker,
    Gateway,
    Unknown,
}

impl DeviceType {
    /// Types whose compromise has direct physical-security impact.
    pub fn is_security_critical(&self) -> bool {
        matches!(self, Self::SecurityCamera | Self::SmartLock)
    }

    /// Types that are network infrastructure rather than endpoints.
    pub fn is_network_infrastructure(&self) -> bool {
        matches!(self, Self::Gateway)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sensor => "sensor",
            Self::SmartLight => "smart_light",
            Self::SmartPlug => "smart_plug",
            Self::Thermostat => "thermostat",
            Self::SecurityCamera => "security_camera",
            Self::SmartLock => "smart_lock",
            Self::SmartSpeaker => "smart_speaker",
            Self::Gateway => "gateway",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How much we trust the device's provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Verified,
    Trusted,
    Neutral,
    Untrusted,
    #[default]
    Unknown,
}

impl TrustLevel {
    pub fn is_trusted(&self) -> bool {
        matches!(self, Self::Verified | Self::Trusted)
    }
}

/// Security level a device (or its profile) declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeclaredSecurityLevel {
    VeryHigh,
    High,
    Medium,
    Low,
    #[default]
    Unknown,
}

/// Signal quality derived from RSSI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl SignalQuality {
    pub fn from_rssi(rssi: i16) -> Self {
        match rssi {
            r if r >= -50 => Self::Excellent,
            r if r >= -65 => Self::Good,
            r if r >= -80 => Self::Fair,
            _ => Self::Poor,
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Excellent | Self::Good)
    }
}

/// Lifecycle status of a device record.
///
/// Membership accounting: `Quarantined` devices count as members of the
/// discovered set; quarantine is tracked by `quarantine_until` on the
/// record, not by a fifth set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Discovered,
    Integrating,
    Integrated,
    PendingApproval,
    Quarantined,
    Rejected,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discovered => write!(f, "discovered"),
            Self::Integrating => write!(f, "integrating"),
            Self::Integrated => write!(f, "integrated"),
            Self::PendingApproval => write!(f, "pending_approval"),
            Self::Quarantined => write!(f, "quarantined"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// The four membership sets of the state invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Membership {
    Discovered,
    Pending,
    Integrated,
    Rejected,
}

impl DeviceStatus {
    /// Map a status onto its membership set.
    pub fn membership(&self) -> Membership {
        match self {
            // Integrating and Quarantined are sub-states of discovered:
            // the device has not yet completed onboarding.
            Self::Discovered | Self::Integrating | Self::Quarantined => Membership::Discovered,
            Self::PendingApproval => Membership::Pending,
            Self::Integrated => Membership::Integrated,
            Self::Rejected => Membership::Rejected,
        }
    }
}

/// One sighting as reported by a protocol driver or the traffic analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDescriptor {
    /// Protocol the device was seen on
    pub protocol: Protocol,
    /// Protocol-level address (IP, BLE address, Zigbee short address, ...)
    pub address: String,
    /// Hardware MAC address, if the protocol exposes one
    pub mac_address: Option<String>,
    /// Advertised model string, if any
    pub model: Option<String>,
    /// Advertised friendly name, if any
    pub name: Option<String>,
    /// Advertised service names
    pub services: Vec<String>,
    /// Advertised characteristics (protocol-specific detail strings)
    pub characteristics: Vec<String>,
    /// Received signal strength in dBm
    pub rssi: i16,
}

impl RawDescriptor {
    pub fn new(protocol: Protocol, address: impl Into<String>) -> Self {
        Self {
            protocol,
            address: address.into(),
            mac_address: None,
            model: None,
            name: None,
            services: Vec::new(),
            characteristics: Vec::new(),
            rssi: -70,
        }
    }

    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac_address = Some(mac.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_services(mut self, services: Vec<String>) -> Self {
        self.services = services;
        self
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = rssi;
        self
    }

    /// Derive the deterministic device id for this sighting.
    pub fn device_id(&self) -> String {
        derive_device_id(
            self.protocol,
            Some(&self.address),
            self.mac_address.as_deref(),
            self.name.as_deref().or(self.model.as_deref()),
        )
    }
}

/// Derive a device id from `(protocol, address|mac|fallback)`.
///
/// Pure and deterministic: the same identity tuple always yields the same
/// id, so repeated sightings of one device collapse onto one record.
pub fn derive_device_id(
    protocol: Protocol,
    address: Option<&str>,
    mac: Option<&str>,
    fallback: Option<&str>,
) -> String {
    let key = address
        .filter(|a| !a.is_empty())
        .or(mac.filter(|m| !m.is_empty()))
        .or(fallback.filter(|f| !f.is_empty()))
        .unwrap_or("anonymous");

    let mut hasher = Sha256::new();
    hasher.update(protocol.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(key.to_ascii_lowercase().as_bytes());
    let digest = hasher.finalize();

    // 8 bytes of digest is plenty for uniqueness and keeps ids readable.
    let mut id = String::with_capacity(4 + 16);
    id.push_str("dev-");
    for byte in &digest[..8] {
        id.push_str(&format!("{byte:02x}"));
    }
    id
}

/// Security attributes derived for a device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityAttributes {
    /// Whether the device's transport supports encryption
    pub encryption_supported: bool,
    /// Authentication methods the device supports
    pub authentication_methods: Vec<String>,
    /// Security level declared by the device or its profile
    pub declared_level: DeclaredSecurityLevel,
}

/// One physically distinct device as tracked by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    // Identity
    pub id: String,
    pub name: String,
    pub device_type: DeviceType,
    pub subtype: Option<String>,

    // Transport
    pub protocol: Protocol,
    pub address: String,
    pub mac_address: Option<String>,

    // Provenance
    pub manufacturer: String,
    pub model: Option<String>,
    pub version: Option<String>,
    pub trust_level: TrustLevel,
    pub certified: bool,

    // Radio quality
    pub rssi: i16,
    pub signal_quality: SignalQuality,
    pub latency_ms: Option<u32>,
    pub interference: Option<f32>,

    // Capabilities and security
    pub capabilities: BTreeSet<String>,
    pub services: Vec<String>,
    pub security: SecurityAttributes,

    // Lifecycle
    pub status: DeviceStatus,
    pub unreachable: bool,
    pub discovered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub quarantine_until: Option<DateTime<Utc>>,
    pub pending_since: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub connection_id: Option<String>,

    // Scoring
    pub compatibility_score: u8,
    pub security_score: u8,
    pub integration_priority: u8,

    /// Free-form metadata from identification
    pub metadata: HashMap<String, String>,
}

impl DeviceRecord {
    /// Build a fresh record from a first sighting. Classification fields
    /// start at their unknown defaults; the identifier fills them in.
    pub fn from_descriptor(descriptor: &RawDescriptor, now: DateTime<Utc>) -> Self {
        let id = descriptor.device_id();
        Self {
            name: descriptor
                .name
                .clone()
                .unwrap_or_else(|| format!("{} device", descriptor.protocol)),
            device_type: DeviceType::Unknown,
            subtype: None,
            protocol: descriptor.protocol,
            address: descriptor.address.clone(),
            mac_address: descriptor.mac_address.clone(),
            manufacturer: "unknown".to_string(),
            model: descriptor.model.clone(),
            version: None,
            trust_level: TrustLevel::Unknown,
            certified: false,
            rssi: descriptor.rssi,
            signal_quality: SignalQuality::from_rssi(descriptor.rssi),
            latency_ms: None,
            interference: None,
            capabilities: BTreeSet::new(),
            services: descriptor.services.clone(),
            security: SecurityAttributes::default(),
            status: DeviceStatus::Discovered,
            unreachable: false,
            discovered_at: now,
            last_seen: now,
            quarantine_until: None,
            pending_since: None,
            rejected_at: None,
            rejection_reason: None,
            connection_id: None,
            compatibility_score: 0,
            security_score: 0,
            integration_priority: 0,
            metadata: HashMap::new(),
            id,
        }
    }

    /// Refresh liveness fields from a repeat sighting.
    pub fn refresh_sighting(&mut self, descriptor: &RawDescriptor, now: DateTime<Utc>) {
        self.last_seen = now;
        self.rssi = descriptor.rssi;
        self.signal_quality = SignalQuality::from_rssi(descriptor.rssi);
    }

    pub fn membership(&self) -> Membership {
        self.status.membership()
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_is_deterministic() {
        let a = derive_device_id(Protocol::Ble, Some("AA:BB:CC:11:22:33"), None, None);
        let b = derive_device_id(Protocol::Ble, Some("aa:bb:cc:11:22:33"), None, None);
        assert_eq!(a, b);
        assert!(a.starts_with("dev-"));
        assert_eq!(a.len(), 20);
    }

    #[test]
    fn test_device_id_differs_by_protocol() {
        let a = derive_device_id(Protocol::Ble, Some("addr"), None, None);
        let b = derive_device_id(Protocol::Wifi, Some("addr"), None, None);
        assert_ne!(a, b);
    }

    #[test]
    fn test_device_id_fallback_chain() {
        let by_mac = derive_device_id(Protocol::Wifi, None, Some("mac"), Some("name"));
        let by_mac_again = derive_device_id(Protocol::Wifi, Some(""), Some("mac"), None);
        assert_eq!(by_mac, by_mac_again);

        let by_name = derive_device_id(Protocol::Wifi, None, None, Some("name"));
        assert_ne!(by_mac, by_name);
    }

    #[test]
    fn test_signal_quality_bands() {
        assert_eq!(SignalQuality::from_rssi(-40), SignalQuality::Excellent);
        assert_eq!(SignalQuality::from_rssi(-60), SignalQuality::Good);
        assert_eq!(SignalQuality::from_rssi(-75), SignalQuality::Fair);
        assert_eq!(SignalQuality::from_rssi(-90), SignalQuality::Poor);
    }

    #[test]
    fn test_membership_mapping() {
        assert_eq!(DeviceStatus::Quarantined.membership(), Membership::Discovered);
        assert_eq!(DeviceStatus::Integrating.membership(), Membership::Discovered);
        assert_eq!(DeviceStatus::PendingApproval.membership(), Membership::Pending);
        assert_eq!(DeviceStatus::Integrated.membership(), Membership::Integrated);
        assert_eq!(DeviceStatus::Rejected.membership(), Membership::Rejected);
    }

    #[test]
    fn test_repeat_sighting_refreshes_liveness_only() {
        let now = Utc::now();
        let descriptor = RawDescriptor::new(Protocol::Zigbee, "0x4431").with_rssi(-72);
        let mut record = DeviceRecord::from_descriptor(&descriptor, now);
        record.device_type = DeviceType::Sensor;

        let later = now + chrono::Duration::minutes(5);
        let resight = RawDescriptor::new(Protocol::Zigbee, "0x4431").with_rssi(-55);
        record.refresh_sighting(&resight, later);

        assert_eq!(record.last_seen, later);
        assert_eq!(record.rssi, -55);
        assert_eq!(record.signal_quality, SignalQuality::Good);
        // Classification untouched
        assert_eq!(record.device_type, DeviceType::Sensor);
        assert_eq!(record.discovered_at, now);
    }
}
