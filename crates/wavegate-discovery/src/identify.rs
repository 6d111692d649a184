//! Device identification.
//!
//! Classifies a raw descriptor against known device profiles, MAC-prefix
//! tables and service-signature tables. Identification is infallible:
//! anything that matches nothing resolves to the unknown default rather
//! than an error.

use serde::{Deserialize, Serialize};

use crate::device::{DeclaredSecurityLevel, DeviceType, RawDescriptor, TrustLevel};

/// A known manufacturer/model family and the defaults it implies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Profile name, used as the suggested device name prefix
    pub name: String,
    /// MAC prefixes (OUI) this family ships with, e.g. "00:17:88"
    pub mac_prefixes: Vec<String>,
    /// Substrings matched case-insensitively against the model string
    pub model_patterns: Vec<String>,
    /// Advertised services that identify this family
    pub service_signatures: Vec<String>,
    pub device_type: DeviceType,
    pub manufacturer: String,
    pub trust_level: TrustLevel,
    pub security_level: DeclaredSecurityLevel,
    /// Whether devices of this family carry platform certification
    pub certified: bool,
}

/// Classification output for one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    pub device_type: DeviceType,
    pub manufacturer: String,
    pub trust_level: TrustLevel,
    pub security_level: DeclaredSecurityLevel,
    pub certified: bool,
    pub suggested_name: String,
}

impl Identification {
    /// The default when nothing matches.
    fn unknown(descriptor: &RawDescriptor) -> Self {
        Self {
            device_type: DeviceType::Unknown,
            manufacturer: "unknown".to_string(),
            trust_level: TrustLevel::Unknown,
            security_level: DeclaredSecurityLevel::Unknown,
            certified: false,
            suggested_name: descriptor
                .name
                .clone()
                .unwrap_or_else(|| format!("Unidentified {} device", descriptor.protocol)),
        }
    }
}

/// Classifies raw descriptors. First match wins, in order: device profile
/// (MAC prefix, then model substring, then service-signature overlap),
/// MAC-prefix table, service-signature table, unknown default.
pub struct Identifier {
    profiles: Vec<DeviceProfile>,
    mac_prefixes: Vec<(String, MacPrefixEntry)>,
    service_signatures: Vec<(String, DeviceType)>,
}

#[derive(Debug, Clone)]
struct MacPrefixEntry {
    manufacturer: String,
    device_type: DeviceType,
    trust_level: TrustLevel,
}

impl Default for Identifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Identifier {
    /// Build an identifier preloaded with the built-in tables.
    pub fn new() -> Self {
        Self {
            profiles: builtin_profiles(),
            mac_prefixes: builtin_mac_prefixes(),
            service_signatures: builtin_service_signatures(),
        }
    }

    /// Build an empty identifier (everything resolves to unknown).
    pub fn empty() -> Self {
        Self {
            profiles: Vec::new(),
            mac_prefixes: Vec::new(),
            service_signatures: Vec::new(),
        }
    }

    /// Register an additional profile. Later registrations are checked
    /// after the built-ins.
    pub fn register_profile(&mut self, profile: DeviceProfile) {
        self.profiles.push(profile);
    }

    /// Classify a descriptor. Always returns a value.
    pub fn identify(&self, descriptor: &RawDescriptor) -> Identification {
        if let Some(profile) = self.match_profile(descriptor) {
            return Identification {
                device_type: profile.device_type,
                manufacturer: profile.manufacturer.clone(),
                trust_level: profile.trust_level,
                security_level: profile.security_level,
                certified: profile.certified,
                suggested_name: descriptor
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("{} ({})", profile.name, descriptor.protocol)),
            };
        }

        if let Some(entry) = self.match_mac_prefix(descriptor) {
            return Identification {
                device_type: entry.device_type,
                manufacturer: entry.manufacturer.clone(),
                trust_level: entry.trust_level,
                security_level: DeclaredSecurityLevel::Unknown,
                certified: false,
                suggested_name: descriptor.name.clone().unwrap_or_else(|| {
                    format!("{} {}", entry.manufacturer, entry.device_type)
                }),
            };
        }

        if let Some(device_type) = self.match_service_signature(descriptor) {
            return Identification {
                device_type,
                manufacturer: "unknown".to_string(),
                trust_level: TrustLevel::Unknown,
                security_level: DeclaredSecurityLevel::Unknown,
                certified: false,
                suggested_name: descriptor
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("Unnamed {device_type}")),
            };
        }

        Identification::unknown(descriptor)
    }

    fn match_profile(&self, descriptor: &RawDescriptor) -> Option<&DeviceProfile> {
        // MAC prefix beats model substring beats service overlap, across
        // the whole profile table.
        if let Some(mac) = descriptor.mac_address.as_deref() {
            let mac = mac.to_ascii_uppercase();
            for profile in &self.profiles {
                if profile
                    .mac_prefixes
                    .iter()
                    .any(|p| mac.starts_with(&p.to_ascii_uppercase()))
                {
                    return Some(profile);
                }
            }
        }

        if let Some(model) = descriptor.model.as_deref() {
            let model = model.to_ascii_lowercase();
            for profile in &self.profiles {
                if profile
                    .model_patterns
                    .iter()
                    .any(|p| model.contains(&p.to_ascii_lowercase()))
                {
                    return Some(profile);
                }
            }
        }

        for profile in &self.profiles {
            if profile.service_signatures.iter().any(|sig| {
                descriptor
                    .services
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(sig))
            }) {
                return Some(profile);
            }
        }

        None
    }

    fn match_mac_prefix(&self, descriptor: &RawDescriptor) -> Option<&MacPrefixEntry> {
        let mac = descriptor.mac_address.as_deref()?.to_ascii_uppercase();
        self.mac_prefixes
            .iter()
            .find(|(prefix, _)| mac.starts_with(&prefix.to_ascii_uppercase()))
            .map(|(_, entry)| entry)
    }

    fn match_service_signature(&self, descriptor: &RawDescriptor) -> Option<DeviceType> {
        for service in &descriptor.services {
            let service = service.to_ascii_lowercase();
            for (signature, device_type) in &self.service_signatures {
                if service.contains(signature.as_str()) {
                    return Some(*device_type);
                }
            }
        }
        None
    }
}

fn builtin_profiles() -> Vec<DeviceProfile> {
    vec![
        DeviceProfile {
            name: "Lumen Bridge Light".to_string(),
            mac_prefixes: vec!["00:17:88".to_string()],
            model_patterns: vec!["lumen".to_string(), "lct".to_string()],
            service_signatures: vec!["lumen_light".to_string()],
            device_type: DeviceType::SmartLight,
            manufacturer: "lumen".to_string(),
            trust_level: TrustLevel::Trusted,
            security_level: DeclaredSecurityLevel::Medium,
            certified: true,
        },
        DeviceProfile {
            name: "Aria Climate Sensor".to_string(),
            mac_prefixes: vec!["54:EF:44".to_string()],
            model_patterns: vec!["aria".to_string(), "wsdcgq".to_string()],
            service_signatures: vec!["aria_telemetry".to_string()],
            device_type: DeviceType::Sensor,
            manufacturer: "aria".to_string(),
            trust_level: TrustLevel::Trusted,
            security_level: DeclaredSecurityLevel::Medium,
            certified: true,
        },
        DeviceProfile {
            name: "Sentine Doorbell Cam".to_string(),
            mac_prefixes: vec!["9C:76:13".to_string()],
            model_patterns: vec!["sentine".to_string()],
            service_signatures: vec!["sentine_stream".to_string()],
            device_type: DeviceType::SecurityCamera,
            manufacturer: "sentine".to_string(),
            trust_level: TrustLevel::Verified,
            security_level: DeclaredSecurityLevel::High,
            certified: true,
        },
        DeviceProfile {
            name: "Keymark Deadbolt".to_string(),
            mac_prefixes: vec!["D0:52:A8".to_string()],
            model_patterns: vec!["keymark".to_string()],
            service_signatures: vec!["keymark_lock".to_string()],
            device_type: DeviceType::SmartLock,
            manufacturer: "keymark".to_string(),
            trust_level: TrustLevel::Verified,
            security_level: DeclaredSecurityLevel::VeryHigh,
            certified: true,
        },
        DeviceProfile {
            name: "Meshweave Router".to_string(),
            mac_prefixes: vec!["74:AC:B9".to_string()],
            model_patterns: vec!["meshweave".to_string()],
            service_signatures: vec!["meshweave_mgmt".to_string()],
            device_type: DeviceType::Gateway,
            manufacturer: "meshweave".to_string(),
            trust_level: TrustLevel::Trusted,
            security_level: DeclaredSecurityLevel::High,
            certified: false,
        },
    ]
}

fn builtin_mac_prefixes() -> Vec<(String, MacPrefixEntry)> {
    vec![
        (
            "B0:BE:76".to_string(),
            MacPrefixEntry {
                manufacturer: "greentap".to_string(),
                device_type: DeviceType::SmartPlug,
                trust_level: TrustLevel::Neutral,
            },
        ),
        (
            "EC:1B:BD".to_string(),
            MacPrefixEntry {
                manufacturer: "silversense".to_string(),
                device_type: DeviceType::Sensor,
                trust_level: TrustLevel::Neutral,
            },
        ),
        (
            "48:A6:B8".to_string(),
            MacPrefixEntry {
                manufacturer: "tonos".to_string(),
                device_type: DeviceType::SmartSpeaker,
                trust_level: TrustLevel::Trusted,
            },
        ),
    ]
}

fn builtin_service_signatures() -> Vec<(String, DeviceType)> {
    vec![
        ("environmental".to_string(), DeviceType::Sensor),
        ("temperature".to_string(), DeviceType::Sensor),
        ("rtsp".to_string(), DeviceType::SecurityCamera),
        ("camera".to_string(), DeviceType::SecurityCamera),
        ("lock".to_string(), DeviceType::SmartLock),
        ("light".to_string(), DeviceType::SmartLight),
        ("dimmer".to_string(), DeviceType::SmartLight),
        ("plug".to_string(), DeviceType::SmartPlug),
        ("thermostat".to_string(), DeviceType::Thermostat),
        ("speaker".to_string(), DeviceType::SmartSpeaker),
        ("router".to_string(), DeviceType::Gateway),
    ]
}
