//! Integration policy.
//!
//! Selects a policy bucket for each device and evaluates ordered gating
//! checks. Evaluation short-circuits: the first failing gate determines
//! the returned reason and later gates are never consulted.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use wavegate_core::MinimumSecurityLevel;

use crate::device::{DeviceRecord, DeviceType};
use crate::security::SecurityBand;

/// Width of the sliding rate-limit window.
fn rate_window() -> Duration {
    Duration::hours(1)
}

/// Policy bucket a device falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyBucket {
    Default,
    SecurityCritical,
    Sensor,
    Network,
}

impl PolicyBucket {
    /// Buckets are selected by device type: security-critical types always
    /// use the strictest bucket, sensors a lenient one, network
    /// infrastructure its own.
    pub fn for_device(record: &DeviceRecord) -> Self {
        if record.device_type.is_security_critical() {
            Self::SecurityCritical
        } else if record.device_type.is_network_infrastructure() {
            Self::Network
        } else if record.device_type == DeviceType::Sensor {
            Self::Sensor
        } else {
            Self::Default
        }
    }
}

impl std::fmt::Display for PolicyBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::SecurityCritical => write!(f, "security_critical"),
            Self::Sensor => write!(f, "sensor"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// Gating configuration for one policy bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationPolicy {
    pub enabled: bool,
    /// Max devices admitted under this bucket within the sliding window
    pub max_devices_per_scan: usize,
    /// Minimum security band the validator must have assigned
    pub security_level_required: MinimumSecurityLevel,
    pub require_manufacturer_whitelist: bool,
    pub require_certification: bool,
    pub allow_unknown_devices: bool,
    /// Quarantine period applied on admission; zero means none
    pub quarantine_secs: i64,
}

impl IntegrationPolicy {
    pub fn quarantine_period(&self) -> Option<Duration> {
        (self.quarantine_secs > 0).then(|| Duration::seconds(self.quarantine_secs))
    }
}

/// The gate that failed, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyGate {
    Enabled,
    RateLimit,
    SecurityLevel,
    ManufacturerWhitelist,
    Certification,
    UnknownDevices,
}

/// What a denial should do to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialDisposition {
    /// The device itself is inadequate; reject it.
    Reject,
    /// An operator process stands in the way; queue for manual approval.
    QueueForApproval,
}

/// Outcome of policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyDecision {
    /// All gates passed; integrate now.
    Allow,
    /// All gates passed but the bucket imposes a quarantine first.
    AllowWithQuarantine { quarantine_secs: i64 },
    /// A gate failed.
    Deny {
        gate: PolicyGate,
        reason: String,
        disposition: DenialDisposition,
    },
}

/// Evaluates integration policy per bucket with a sliding-window rate limit.
pub struct PolicyEngine {
    policies: HashMap<PolicyBucket, IntegrationPolicy>,
    manufacturer_whitelist: HashSet<String>,
    /// Admission timestamps per bucket, pruned to the sliding window.
    admissions: Mutex<HashMap<PolicyBucket, VecDeque<DateTime<Utc>>>>,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyEngine {
    /// Build an engine with the built-in bucket policies and whitelist.
    pub fn new() -> Self {
        Self {
            policies: builtin_policies(),
            manufacturer_whitelist: builtin_whitelist(),
            admissions: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the policy for a bucket.
    pub fn set_policy(&mut self, bucket: PolicyBucket, policy: IntegrationPolicy) {
        self.policies.insert(bucket, policy);
    }

    /// Add a manufacturer to the whitelist.
    pub fn whitelist_manufacturer(&mut self, manufacturer: impl Into<String>) {
        self.manufacturer_whitelist
            .insert(manufacturer.into().to_ascii_lowercase());
    }

    pub fn policy_for(&self, bucket: PolicyBucket) -> Option<&IntegrationPolicy> {
        self.policies.get(&bucket)
    }

    /// Evaluate all gates in fixed order for a device.
    ///
    /// `band` is the security band the validator assigned. `now` is
    /// injected so time-based gates are testable.
    pub fn evaluate(
        &self,
        record: &DeviceRecord,
        band: SecurityBand,
        now: DateTime<Utc>,
    ) -> PolicyDecision {
        let bucket = PolicyBucket::for_device(record);
        let Some(policy) = self.policies.get(&bucket) else {
            return PolicyDecision::Deny {
                gate: PolicyGate::Enabled,
                reason: format!("no policy configured for bucket {bucket}"),
                disposition: DenialDisposition::Reject,
            };
        };

        if !policy.enabled {
            return PolicyDecision::Deny {
                gate: PolicyGate::Enabled,
                reason: format!("integration disabled for {bucket} devices"),
                disposition: DenialDisposition::Reject,
            };
        }

        if self.admissions_in_window(bucket, now) >= policy.max_devices_per_scan {
            return PolicyDecision::Deny {
                gate: PolicyGate::RateLimit,
                reason: format!(
                    "rate limit reached: {} devices integrated under {bucket} in the last hour",
                    policy.max_devices_per_scan
                ),
                disposition: DenialDisposition::QueueForApproval,
            };
        }

        if !band.satisfies(policy.security_level_required) {
            return PolicyDecision::Deny {
                gate: PolicyGate::SecurityLevel,
                reason: format!(
                    "security band {band} below required {} for {bucket} devices",
                    policy.security_level_required
                ),
                disposition: DenialDisposition::Reject,
            };
        }

        if policy.require_manufacturer_whitelist
            && !self
                .manufacturer_whitelist
                .contains(&record.manufacturer.to_ascii_lowercase())
        {
            return PolicyDecision::Deny {
                gate: PolicyGate::ManufacturerWhitelist,
                reason: format!("manufacturer '{}' is not whitelisted", record.manufacturer),
                disposition: DenialDisposition::QueueForApproval,
            };
        }

        if policy.require_certification && !record.certified {
            return PolicyDecision::Deny {
                gate: PolicyGate::Certification,
                reason: "device lacks platform certification".to_string(),
                disposition: DenialDisposition::QueueForApproval,
            };
        }

        if !policy.allow_unknown_devices && record.manufacturer == "unknown" {
            return PolicyDecision::Deny {
                gate: PolicyGate::UnknownDevices,
                reason: format!("unknown-manufacturer devices not allowed in {bucket} bucket"),
                disposition: DenialDisposition::QueueForApproval,
            };
        }

        match policy.quarantine_period() {
            Some(period) => PolicyDecision::AllowWithQuarantine {
                quarantine_secs: period.num_seconds(),
            },
            None => PolicyDecision::Allow,
        }
    }

    /// Record a successful admission, counting toward the rate limit.
    pub fn record_admission(&self, record: &DeviceRecord, now: DateTime<Utc>) {
        let bucket = PolicyBucket::for_device(record);
        let mut admissions = self.admissions.lock();
        admissions.entry(bucket).or_default().push_back(now);
    }

    fn admissions_in_window(&self, bucket: PolicyBucket, now: DateTime<Utc>) -> usize {
        let mut admissions = self.admissions.lock();
        let Some(window) = admissions.get_mut(&bucket) else {
            return 0;
        };
        let cutoff = now - rate_window();
        while window.front().is_some_and(|t| *t < cutoff) {
            window.pop_front();
        }
        window.len()
    }
}

fn builtin_policies() -> HashMap<PolicyBucket, IntegrationPolicy> {
    HashMap::from([
        (
            PolicyBucket::Default,
            IntegrationPolicy {
                enabled: true,
                max_devices_per_scan: 10,
                security_level_required: MinimumSecurityLevel::Medium,
                require_manufacturer_whitelist: false,
                require_certification: false,
                allow_unknown_devices: false,
                quarantine_secs: 0,
            },
        ),
        (
            PolicyBucket::SecurityCritical,
            IntegrationPolicy {
                enabled: true,
                max_devices_per_scan: 2,
                security_level_required: MinimumSecurityLevel::High,
                require_manufacturer_whitelist: true,
                require_certification: true,
                allow_unknown_devices: false,
                quarantine_secs: 1800,
            },
        ),
        (
            PolicyBucket::Sensor,
            IntegrationPolicy {
                enabled: true,
                max_devices_per_scan: 25,
                security_level_required: MinimumSecurityLevel::Low,
                require_manufacturer_whitelist: false,
                require_certification: false,
                allow_unknown_devices: true,
                quarantine_secs: 0,
            },
        ),
        (
            PolicyBucket::Network,
            IntegrationPolicy {
                enabled: true,
                max_devices_per_scan: 3,
                security_level_required: MinimumSecurityLevel::High,
                require_manufacturer_whitelist: true,
                require_certification: false,
                allow_unknown_devices: false,
                quarantine_secs: 900,
            },
        ),
    ])
}

fn builtin_whitelist() -> HashSet<String> {
    ["lumen", "aria", "sentine", "keymark", "meshweave", "tonos"]
        .iter()
        .map(|m| (*m).to_string())
        .collect()
}
