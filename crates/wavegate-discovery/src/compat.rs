//! Compatibility scoring.
//!
//! Applies the per-device-type rule to produce a bounded score and an
//! auto-integrate eligibility flag. Scoring is additive after two
//! fail-fast gates: a protocol mismatch or a missing required capability
//! zeroes the score with no partial credit.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::capability::caps;
use crate::device::{DeviceRecord, DeviceType, Protocol};
use crate::security::{SecurityRequirement, SecurityValidator};

/// Scoring weights and the compatibility threshold. Tunable constants,
/// not business rules.
pub mod weights {
    pub const REQUIRED_CAPS: u8 = 40;
    pub const SECURITY_MAX: u8 = 20;
    pub const OPTIONAL_MAX: u8 = 15;
    pub const TRUST: u8 = 10;
    pub const SIGNAL: u8 = 5;
    pub const COMPATIBLE_THRESHOLD: u8 = 70;
}

/// Integration requirements for one device type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityRule {
    pub device_type: DeviceType,
    /// Protocols this type may integrate over
    pub required_protocols: BTreeSet<Protocol>,
    /// Capabilities that must all be present (fail-fast)
    pub required_capabilities: BTreeSet<String>,
    /// Capabilities that contribute a proportional bonus
    pub optional_capabilities: BTreeSet<String>,
    /// Named security checks that scale the security contribution
    pub security_requirements: Vec<SecurityRequirement>,
    /// Whether a compatible device may integrate without approval
    pub auto_integrate: bool,
    /// Relative priority when integrating multiple devices
    pub integration_priority: u8,
}

/// Result of scoring a device against its type's rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityReport {
    /// Score in [0, 100]
    pub score: u8,
    pub compatible: bool,
    /// Eligible for integration without operator approval
    pub auto_integrate: bool,
    pub integration_priority: u8,
    /// Why the device failed, when it did
    pub failure_reason: Option<String>,
}

impl CompatibilityReport {
    fn failed(reason: impl Into<String>) -> Self {
        Self {
            score: 0,
            compatible: false,
            auto_integrate: false,
            integration_priority: 0,
            failure_reason: Some(reason.into()),
        }
    }
}

/// Scores devices against per-type compatibility rules.
pub struct CompatibilityScorer {
    rules: HashMap<DeviceType, CompatibilityRule>,
    validator: SecurityValidator,
}

impl Default for CompatibilityScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl CompatibilityScorer {
    /// Build a scorer with the built-in rule set.
    pub fn new() -> Self {
        Self {
            rules: builtin_rules(),
            validator: SecurityValidator::new(),
        }
    }

    /// Replace or add the rule for a device type.
    pub fn set_rule(&mut self, rule: CompatibilityRule) {
        self.rules.insert(rule.device_type, rule);
    }

    pub fn rule_for(&self, device_type: DeviceType) -> Option<&CompatibilityRule> {
        self.rules.get(&device_type)
    }

    /// Score a device. `auto_integration_enabled` is the global toggle;
    /// the report's `auto_integrate` is only true when the device is
    /// compatible, the rule allows it, and the toggle is on.
    pub fn score(
        &self,
        record: &DeviceRecord,
        auto_integration_enabled: bool,
    ) -> CompatibilityReport {
        let Some(rule) = self.rules.get(&record.device_type) else {
            return CompatibilityReport::failed(format!(
                "unknown device type: {}",
                record.device_type
            ));
        };

        // Gate: protocol must be acceptable for this type. Critical
        // failure, no partial credit.
        if !rule.required_protocols.contains(&record.protocol) {
            return CompatibilityReport::failed(format!(
                "protocol {} not supported for {}",
                record.protocol, record.device_type
            ));
        }

        // Gate: every required capability must be present.
        for cap in &rule.required_capabilities {
            if !record.has_capability(cap) {
                return CompatibilityReport::failed(format!("missing required capability: {cap}"));
            }
        }

        let mut score = weights::REQUIRED_CAPS;

        score += self.validator.scaled_contribution(
            record,
            &rule.security_requirements,
            weights::SECURITY_MAX,
        );

        if !rule.optional_capabilities.is_empty() {
            let present = rule
                .optional_capabilities
                .iter()
                .filter(|cap| record.has_capability(cap))
                .count();
            let fraction = present as f64 / rule.optional_capabilities.len() as f64;
            score += (fraction * f64::from(weights::OPTIONAL_MAX)).round() as u8;
        }

        if record.trust_level.is_trusted() {
            score += weights::TRUST;
        }
        if record.signal_quality.is_usable() {
            score += weights::SIGNAL;
        }

        let score = score.min(100);
        let compatible = score >= weights::COMPATIBLE_THRESHOLD;

        CompatibilityReport {
            score,
            compatible,
            auto_integrate: compatible && rule.auto_integrate && auto_integration_enabled,
            integration_priority: rule.integration_priority,
            failure_reason: None,
        }
    }
}

fn string_set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn builtin_rules() -> HashMap<DeviceType, CompatibilityRule> {
    let rules = vec![
        CompatibilityRule {
            device_type: DeviceType::Sensor,
            required_protocols: BTreeSet::from([
                Protocol::Zigbee,
                Protocol::Zwave,
                Protocol::Ble,
                Protocol::Thread,
                Protocol::Matter,
                Protocol::Wifi,
            ]),
            required_capabilities: string_set(&[caps::SENSOR_DATA]),
            optional_capabilities: string_set(&[
                caps::BATTERY_STATUS,
                caps::LOW_POWER,
                caps::MESH_NETWORKING,
            ]),
            security_requirements: vec![SecurityRequirement::Encryption],
            auto_integrate: true,
            integration_priority: 5,
        },
        CompatibilityRule {
            device_type: DeviceType::SmartLight,
            required_protocols: BTreeSet::from([
                Protocol::Zigbee,
                Protocol::Wifi,
                Protocol::Thread,
                Protocol::Matter,
            ]),
            required_capabilities: string_set(&[caps::ON_OFF]),
            optional_capabilities: string_set(&[caps::DIMMING, caps::COLOR_CONTROL]),
            security_requirements: vec![SecurityRequirement::Encryption],
            auto_integrate: true,
            integration_priority: 4,
        },
        CompatibilityRule {
            device_type: DeviceType::SmartPlug,
            required_protocols: BTreeSet::from([
                Protocol::Zigbee,
                Protocol::Zwave,
                Protocol::Wifi,
                Protocol::Matter,
            ]),
            required_capabilities: string_set(&[caps::ON_OFF]),
            optional_capabilities: string_set(&[caps::POWER_METERING]),
            security_requirements: vec![SecurityRequirement::Encryption],
            auto_integrate: true,
            integration_priority: 4,
        },
        CompatibilityRule {
            device_type: DeviceType::Thermostat,
            required_protocols: BTreeSet::from([
                Protocol::Zigbee,
                Protocol::Zwave,
                Protocol::Wifi,
                Protocol::Thread,
                Protocol::Matter,
            ]),
            required_capabilities: string_set(&[caps::CLIMATE_CONTROL]),
            optional_capabilities: string_set(&[caps::SENSOR_DATA, caps::BATTERY_STATUS]),
            security_requirements: vec![
                SecurityRequirement::Encryption,
                SecurityRequirement::Authentication,
            ],
            auto_integrate: true,
            integration_priority: 6,
        },
        CompatibilityRule {
            device_type: DeviceType::SecurityCamera,
            required_protocols: BTreeSet::from([Protocol::Wifi]),
            required_capabilities: string_set(&[caps::VIDEO_STREAMING]),
            optional_capabilities: string_set(&[
                caps::MOTION_DETECTION,
                caps::NIGHT_VISION,
                caps::AUDIO,
            ]),
            security_requirements: vec![
                SecurityRequirement::Encryption,
                SecurityRequirement::Authentication,
                SecurityRequirement::SecureStreaming,
            ],
            auto_integrate: false,
            integration_priority: 9,
        },
        CompatibilityRule {
            device_type: DeviceType::SmartLock,
            required_protocols: BTreeSet::from([
                Protocol::Zigbee,
                Protocol::Zwave,
                Protocol::Ble,
                Protocol::Thread,
            ]),
            required_capabilities: string_set(&[caps::LOCK_CONTROL]),
            optional_capabilities: string_set(&[caps::BATTERY_STATUS, caps::TAMPER_DETECTION]),
            security_requirements: vec![
                SecurityRequirement::Encryption,
                SecurityRequirement::Authentication,
                SecurityRequirement::TamperDetection,
            ],
            auto_integrate: false,
            integration_priority: 10,
        },
        CompatibilityRule {
            device_type: DeviceType::SmartSpeaker,
            required_protocols: BTreeSet::from([Protocol::Wifi]),
            required_capabilities: string_set(&[caps::AUDIO_PLAYBACK]),
            optional_capabilities: string_set(&[caps::AUDIO]),
            security_requirements: vec![SecurityRequirement::Encryption],
            auto_integrate: true,
            integration_priority: 3,
        },
        CompatibilityRule {
            device_type: DeviceType::Gateway,
            required_protocols: BTreeSet::from([Protocol::Wifi]),
            required_capabilities: string_set(&[caps::NETWORK_ROUTING]),
            optional_capabilities: string_set(&[caps::FIRMWARE_UPDATE]),
            security_requirements: vec![
                SecurityRequirement::Encryption,
                SecurityRequirement::Authentication,
            ],
            auto_integrate: false,
            integration_priority: 8,
        },
    ];

    rules.into_iter().map(|r| (r.device_type, r)).collect()
}
