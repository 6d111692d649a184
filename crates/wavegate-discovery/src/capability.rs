//! Capability derivation.
//!
//! Capabilities are derived deterministically, never scored: the protocol
//! contributes a baseline, the classified device type contributes its
//! canonical list, and each advertised service is pattern-matched for the
//! capability it implies.

use std::collections::BTreeSet;

use crate::device::{DeviceType, Protocol, RawDescriptor, SecurityAttributes};

/// Well-known capability names.
pub mod caps {
    pub const SENSOR_DATA: &str = "sensor_data";
    pub const BATTERY_STATUS: &str = "battery_status";
    pub const LOW_POWER: &str = "low_power";
    pub const MESH_NETWORKING: &str = "mesh_networking";
    pub const HIGH_BANDWIDTH: &str = "high_bandwidth";
    pub const IP_CONNECTIVITY: &str = "ip_connectivity";
    pub const PROXIMITY: &str = "proximity";
    pub const ON_OFF: &str = "on_off";
    pub const DIMMING: &str = "dimming";
    pub const COLOR_CONTROL: &str = "color_control";
    pub const POWER_METERING: &str = "power_metering";
    pub const CLIMATE_CONTROL: &str = "climate_control";
    pub const VIDEO_STREAMING: &str = "video_streaming";
    pub const MOTION_DETECTION: &str = "motion_detection";
    pub const NIGHT_VISION: &str = "night_vision";
    pub const AUDIO: &str = "audio";
    pub const AUDIO_PLAYBACK: &str = "audio_playback";
    pub const LOCK_CONTROL: &str = "lock_control";
    pub const TAMPER_DETECTION: &str = "tamper_detection";
    pub const NETWORK_ROUTING: &str = "network_routing";
    pub const FIRMWARE_UPDATE: &str = "firmware_update";
}

/// Result of capability analysis.
#[derive(Debug, Clone)]
pub struct CapabilityProfile {
    pub capabilities: BTreeSet<String>,
    pub security: SecurityAttributes,
}

/// Derives device capabilities and baseline security attributes.
#[derive(Debug, Default, Clone, Copy)]
pub struct CapabilityAnalyzer;

impl CapabilityAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Derive the capability set for a classified device.
    pub fn analyze(
        &self,
        descriptor: &RawDescriptor,
        device_type: DeviceType,
    ) -> CapabilityProfile {
        let mut capabilities = BTreeSet::new();

        for cap in protocol_capabilities(descriptor.protocol) {
            capabilities.insert((*cap).to_string());
        }
        for cap in type_capabilities(device_type) {
            capabilities.insert((*cap).to_string());
        }
        for service in &descriptor.services {
            for cap in service_capabilities(service) {
                capabilities.insert(cap.to_string());
            }
        }

        CapabilityProfile {
            capabilities,
            security: protocol_security_baseline(descriptor.protocol),
        }
    }
}

/// Baseline capabilities contributed by the transport protocol.
fn protocol_capabilities(protocol: Protocol) -> &'static [&'static str] {
    match protocol {
        Protocol::Wifi => &[caps::HIGH_BANDWIDTH, caps::IP_CONNECTIVITY],
        Protocol::Ble => &[caps::LOW_POWER, caps::PROXIMITY],
        Protocol::Zigbee | Protocol::Zwave => &[caps::MESH_NETWORKING, caps::LOW_POWER],
        Protocol::Thread => &[caps::MESH_NETWORKING, caps::LOW_POWER, caps::IP_CONNECTIVITY],
        Protocol::Matter => &[caps::IP_CONNECTIVITY],
    }
}

/// Canonical capabilities for a declared device type.
fn type_capabilities(device_type: DeviceType) -> &'static [&'static str] {
    match device_type {
        DeviceType::Sensor => &[caps::SENSOR_DATA],
        DeviceType::SmartLight => &[caps::ON_OFF, caps::DIMMING],
        DeviceType::SmartPlug => &[caps::ON_OFF, caps::POWER_METERING],
        DeviceType::Thermostat => &[caps::CLIMATE_CONTROL, caps::SENSOR_DATA],
        DeviceType::SecurityCamera => &[caps::VIDEO_STREAMING, caps::MOTION_DETECTION],
        DeviceType::SmartLock => &[caps::LOCK_CONTROL],
        DeviceType::SmartSpeaker => &[caps::AUDIO_PLAYBACK],
        DeviceType::Gateway => &[caps::NETWORK_ROUTING, caps::IP_CONNECTIVITY],
        DeviceType::Unknown => &[],
    }
}

/// Capabilities implied by an advertised service name.
fn service_capabilities(service: &str) -> Vec<&'static str> {
    let service = service.to_ascii_lowercase();
    let mut implied = Vec::new();

    if service.contains("battery") {
        implied.push(caps::BATTERY_STATUS);
    }
    if service.contains("temperature")
        || service.contains("humidity")
        || service.contains("environmental")
        || service.contains("air_quality")
    {
        implied.push(caps::SENSOR_DATA);
    }
    if service.contains("motion") || service.contains("occupancy") {
        implied.push(caps::MOTION_DETECTION);
    }
    if service.contains("video") || service.contains("rtsp") || service.contains("stream") {
        implied.push(caps::VIDEO_STREAMING);
    }
    if service.contains("audio") || service.contains("speaker") {
        implied.push(caps::AUDIO);
    }
    if service.contains("lock") {
        implied.push(caps::LOCK_CONTROL);
    }
    if service.contains("tamper") {
        implied.push(caps::TAMPER_DETECTION);
    }
    if service.contains("light") || service.contains("dimmer") || service.contains("switch") {
        implied.push(caps::ON_OFF);
    }
    if service.contains("color") {
        implied.push(caps::COLOR_CONTROL);
    }
    if service.contains("energy") || service.contains("power") {
        implied.push(caps::POWER_METERING);
    }
    if service.contains("ota") || service.contains("firmware") {
        implied.push(caps::FIRMWARE_UPDATE);
    }

    implied
}

/// Baseline security attributes each protocol is known to provide.
fn protocol_security_baseline(protocol: Protocol) -> SecurityAttributes {
    let (encryption_supported, methods): (bool, &[&str]) = match protocol {
        Protocol::Wifi => (true, &["wpa2"]),
        // Plain advertisement scanning gives no evidence of pairing support.
        Protocol::Ble => (false, &[]),
        Protocol::Zigbee => (true, &["network_key"]),
        Protocol::Zwave => (true, &["s2"]),
        Protocol::Thread => (true, &["dtls"]),
        Protocol::Matter => (true, &["pase"]),
    };

    SecurityAttributes {
        encryption_supported,
        authentication_methods: methods.iter().map(|m| (*m).to_string()).collect(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_protocol_contributes_baseline() {
        let descriptor = RawDescriptor::new(Protocol::Zigbee, "0x1a2b");
        let profile = CapabilityAnalyzer::new().analyze(&descriptor, DeviceType::Sensor);

        assert!(profile.capabilities.contains(caps::MESH_NETWORKING));
        assert!(profile.capabilities.contains(caps::LOW_POWER));
        assert!(profile.capabilities.contains(caps::SENSOR_DATA));
        assert!(profile.security.encryption_supported);
        assert!(!profile.security.authentication_methods.is_empty());
    }

    #[test]
    fn test_service_pattern_matching() {
        let descriptor = RawDescriptor::new(Protocol::Ble, "AA:BB:CC:00:11:22").with_services(vec![
            "battery_service".to_string(),
            "temperature_measurement".to_string(),
        ]);
        let profile = CapabilityAnalyzer::new().analyze(&descriptor, DeviceType::Sensor);

        assert!(profile.capabilities.contains(caps::BATTERY_STATUS));
        assert!(profile.capabilities.contains(caps::SENSOR_DATA));
    }

    #[test]
    fn test_ble_has_no_encryption_baseline() {
        let descriptor = RawDescriptor::new(Protocol::Ble, "AA:BB:CC:00:11:22");
        let profile = CapabilityAnalyzer::new().analyze(&descriptor, DeviceType::Unknown);
        assert!(!profile.security.encryption_supported);
        assert!(profile.security.authentication_methods.is_empty());
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let descriptor = RawDescriptor::new(Protocol::Wifi, "192.168.1.40")
            .with_services(vec!["rtsp_stream".to_string()]);
        let analyzer = CapabilityAnalyzer::new();
        let a = analyzer.analyze(&descriptor, DeviceType::SecurityCamera);
        let b = analyzer.analyze(&descriptor, DeviceType::SecurityCamera);
        assert_eq!(a.capabilities, b.capabilities);
    }
}
