//! Security posture validation.
//!
//! Scores a device's security posture independently of compatibility and
//! gates integration against the platform's minimum security level. The
//! score and its band mapping are pure functions of the device record.

use serde::{Deserialize, Serialize};

use wavegate_core::MinimumSecurityLevel;

use crate::capability::caps;
use crate::device::{DeclaredSecurityLevel, DeviceRecord, TrustLevel};

/// Scoring weights. Tunable constants, not business rules.
pub mod weights {
    pub const ENCRYPTION: u8 = 25;
    pub const AUTHENTICATION: u8 = 20;
    pub const TRUST_VERIFIED: u8 = 25;
    pub const TRUST_TRUSTED: u8 = 15;
    pub const LEVEL_VERY_HIGH: u8 = 20;
    pub const LEVEL_HIGH: u8 = 15;
    pub const LEVEL_MEDIUM: u8 = 10;
    pub const LEVEL_LOW: u8 = 5;
    pub const PROTOCOL_MESH: u8 = 10;
    pub const PROTOCOL_WIFI: u8 = 5;
    pub const PROTOCOL_OTHER: u8 = 3;

    pub const BAND_HIGH_MIN: u8 = 80;
    pub const BAND_MEDIUM_MIN: u8 = 60;
    pub const BAND_LOW_MIN: u8 = 40;
}

/// Security band a validated score falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityBand {
    VeryLow,
    Low,
    Medium,
    High,
}

impl SecurityBand {
    /// Pure mapping from score to band.
    pub fn from_score(score: u8) -> Self {
        match score {
            s if s >= weights::BAND_HIGH_MIN => Self::High,
            s if s >= weights::BAND_MEDIUM_MIN => Self::Medium,
            s if s >= weights::BAND_LOW_MIN => Self::Low,
            _ => Self::VeryLow,
        }
    }

    /// Whether this band satisfies a required minimum level.
    pub fn satisfies(&self, required: MinimumSecurityLevel) -> bool {
        match self {
            Self::High => true,
            Self::Medium => required != MinimumSecurityLevel::High,
            Self::Low => required == MinimumSecurityLevel::Low,
            Self::VeryLow => false,
        }
    }
}

impl std::fmt::Display for SecurityBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
            Self::VeryLow => write!(f, "very_low"),
        }
    }
}

/// Named security requirement checks a compatibility rule may demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityRequirement {
    Encryption,
    Authentication,
    SecureStreaming,
    TamperDetection,
}

impl SecurityRequirement {
    /// Whether the device satisfies this named check.
    pub fn is_satisfied_by(&self, record: &DeviceRecord) -> bool {
        match self {
            Self::Encryption => record.security.encryption_supported,
            Self::Authentication => !record.security.authentication_methods.is_empty(),
            Self::SecureStreaming => {
                record.security.encryption_supported
                    && record.has_capability(caps::VIDEO_STREAMING)
            }
            Self::TamperDetection => record.has_capability(caps::TAMPER_DETECTION),
        }
    }
}

/// Outcome of a security validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityAssessment {
    /// Score in [0, 100]
    pub score: u8,
    pub band: SecurityBand,
    /// Whether the band satisfies the platform's required minimum level
    pub valid: bool,
}

/// Scores security posture and gates against the required minimum level.
#[derive(Debug, Default, Clone, Copy)]
pub struct SecurityValidator;

impl SecurityValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a device against the platform's required minimum level.
    pub fn validate(
        &self,
        record: &DeviceRecord,
        required: MinimumSecurityLevel,
    ) -> SecurityAssessment {
        let score = self.score(record);
        let band = SecurityBand::from_score(score);
        SecurityAssessment {
            score,
            band,
            valid: band.satisfies(required),
        }
    }

    /// Compute the raw security score in [0, 100].
    pub fn score(&self, record: &DeviceRecord) -> u8 {
        let mut score = 0u8;

        if record.security.encryption_supported {
            score += weights::ENCRYPTION;
        }
        if !record.security.authentication_methods.is_empty() {
            score += weights::AUTHENTICATION;
        }
        score += match record.trust_level {
            TrustLevel::Verified => weights::TRUST_VERIFIED,
            TrustLevel::Trusted => weights::TRUST_TRUSTED,
            _ => 0,
        };
        score += match record.security.declared_level {
            DeclaredSecurityLevel::VeryHigh => weights::LEVEL_VERY_HIGH,
            DeclaredSecurityLevel::High => weights::LEVEL_HIGH,
            DeclaredSecurityLevel::Medium => weights::LEVEL_MEDIUM,
            DeclaredSecurityLevel::Low => weights::LEVEL_LOW,
            DeclaredSecurityLevel::Unknown => 0,
        };
        score += if record.protocol.is_mesh() {
            weights::PROTOCOL_MESH
        } else if record.protocol == crate::device::Protocol::Wifi {
            weights::PROTOCOL_WIFI
        } else {
            weights::PROTOCOL_OTHER
        };

        score.min(100)
    }

    /// Scale the security score into the 0-20 contribution the
    /// compatibility scorer consumes, weighted by the fraction of the
    /// rule's named requirement checks the device satisfies.
    pub fn scaled_contribution(
        &self,
        record: &DeviceRecord,
        requirements: &[SecurityRequirement],
        max_points: u8,
    ) -> u8 {
        let score = self.score(record);
        let base = f64::from(score) / 100.0 * f64::from(max_points);

        let fraction = if requirements.is_empty() {
            1.0
        } else {
            let satisfied = requirements
                .iter()
                .filter(|req| req.is_satisfied_by(record))
                .count();
            satisfied as f64 / requirements.len() as f64
        };

        (base * fraction).round() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceRecord, Protocol, RawDescriptor};
    use chrono::Utc;

    fn record(protocol: Protocol) -> DeviceRecord {
        let descriptor = RawDescriptor::new(protocol, "addr-1");
        DeviceRecord::from_descriptor(&descriptor, Utc::now())
    }

    #[test]
    fn test_score_is_bounded() {
        let mut rec = record(Protocol::Zigbee);
        rec.security.encryption_supported = true;
        rec.security.authentication_methods = vec!["network_key".to_string()];
        rec.trust_level = TrustLevel::Verified;
        rec.security.declared_level = DeclaredSecurityLevel::VeryHigh;

        let score = SecurityValidator::new().score(&rec);
        assert_eq!(score, 100);
    }

    #[test]
    fn test_band_mapping_is_stable() {
        let mut rec = record(Protocol::Zigbee);
        rec.security.encryption_supported = true;
        rec.security.authentication_methods = vec!["network_key".to_string()];
        rec.trust_level = TrustLevel::Trusted;
        rec.security.declared_level = DeclaredSecurityLevel::Medium;

        let validator = SecurityValidator::new();
        let a = validator.validate(&rec, MinimumSecurityLevel::Medium);
        let b = validator.validate(&rec, MinimumSecurityLevel::Medium);
        assert_eq!(a, b);
        // 25 + 20 + 15 + 10 + 10
        assert_eq!(a.score, 80);
        assert_eq!(a.band, SecurityBand::High);
        assert!(a.valid);
    }

    #[test]
    fn test_band_thresholds() {
        assert_eq!(SecurityBand::from_score(100), SecurityBand::High);
        assert_eq!(SecurityBand::from_score(80), SecurityBand::High);
        assert_eq!(SecurityBand::from_score(79), SecurityBand::Medium);
        assert_eq!(SecurityBand::from_score(60), SecurityBand::Medium);
        assert_eq!(SecurityBand::from_score(59), SecurityBand::Low);
        assert_eq!(SecurityBand::from_score(40), SecurityBand::Low);
        assert_eq!(SecurityBand::from_score(39), SecurityBand::VeryLow);
        assert_eq!(SecurityBand::from_score(0), SecurityBand::VeryLow);
    }

    #[test]
    fn test_band_validity_rules() {
        assert!(SecurityBand::High.satisfies(MinimumSecurityLevel::High));
        assert!(SecurityBand::Medium.satisfies(MinimumSecurityLevel::Medium));
        assert!(!SecurityBand::Medium.satisfies(MinimumSecurityLevel::High));
        assert!(SecurityBand::Low.satisfies(MinimumSecurityLevel::Low));
        assert!(!SecurityBand::Low.satisfies(MinimumSecurityLevel::Medium));
        assert!(!SecurityBand::VeryLow.satisfies(MinimumSecurityLevel::Low));
    }

    #[test]
    fn test_scaled_contribution_without_requirements() {
        let mut rec = record(Protocol::Zigbee);
        rec.security.encryption_supported = true;
        rec.security.authentication_methods = vec!["network_key".to_string()];
        rec.trust_level = TrustLevel::Trusted;
        rec.security.declared_level = DeclaredSecurityLevel::Medium;

        // score 80 → 80% of 20 points
        let points = SecurityValidator::new().scaled_contribution(&rec, &[], 20);
        assert_eq!(points, 16);
    }

    #[test]
    fn test_scaled_contribution_halved_by_unmet_requirements() {
        let mut rec = record(Protocol::Zigbee);
        rec.security.encryption_supported = true;
        rec.security.authentication_methods = vec!["network_key".to_string()];
        rec.trust_level = TrustLevel::Trusted;
        rec.security.declared_level = DeclaredSecurityLevel::Medium;

        // Encryption satisfied, tamper detection not: half the base.
        let points = SecurityValidator::new().scaled_contribution(
            &rec,
            &[
                SecurityRequirement::Encryption,
                SecurityRequirement::TamperDetection,
            ],
            20,
        );
        assert_eq!(points, 8);
    }

    #[test]
    fn test_secure_streaming_requires_encrypted_stream() {
        let mut rec = record(Protocol::Wifi);
        rec.security.encryption_supported = true;
        assert!(!SecurityRequirement::SecureStreaming.is_satisfied_by(&rec));

        rec.capabilities.insert(caps::VIDEO_STREAMING.to_string());
        assert!(SecurityRequirement::SecureStreaming.is_satisfied_by(&rec));
    }
}
