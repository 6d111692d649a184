//! Device discovery and onboarding pipeline.
//!
//! Periodically scans heterogeneous wireless protocols for new devices,
//! classifies them against known profiles, scores compatibility and
//! security posture, applies integration policy, and drives each device
//! from first sighting to one of: active integration, quarantine,
//! manual-approval queueing, or rejection.
//!
//! ## Architecture
//!
//! - **Identifier / CapabilityAnalyzer**: classify a raw descriptor and
//!   derive its capability set.
//! - **CompatibilityScorer / SecurityValidator**: bounded scores with
//!   fail-fast gates and band mapping.
//! - **PolicyEngine**: per-bucket ordered gating checks.
//! - **DiscoveryPipeline**: the lifecycle state machine owning every
//!   device record.
//! - **DiscoveryService**: background schedule plus the operator API.
//!
//! Radio drivers, registry persistence, configuration push and health
//! probing are collaborators behind the traits in [`drivers`].

pub mod capability;
pub mod compat;
pub mod device;
pub mod drivers;
pub mod error;
pub mod identify;
pub mod monitor;
pub mod pipeline;
pub mod policy;
pub mod scheduler;
pub mod security;
pub mod service;
pub mod store;

// Re-exports for convenience
pub use capability::{caps, CapabilityAnalyzer, CapabilityProfile};
pub use compat::{CompatibilityReport, CompatibilityRule, CompatibilityScorer};
pub use device::{
    derive_device_id, DeclaredSecurityLevel, DeviceRecord, DeviceStatus, DeviceType, Membership,
    Protocol, RawDescriptor, SignalQuality, TrustLevel,
};
pub use drivers::{
    ConfigurationError, DeviceConfigurator, DeviceIntegrator, HealthProbe, HealthState,
    IntegrationError, ProtocolScanner, RegistrySink, ScanDepth, ScanError, TrafficAnalyzer,
    TrafficCandidate,
};
pub use error::{DiscoveryError, Result};
pub use identify::{DeviceProfile, Identification, Identifier};
pub use monitor::HealthMonitor;
pub use pipeline::{DiscoveryPipeline, IntegrationDrivers};
pub use policy::{
    DenialDisposition, IntegrationPolicy, PolicyBucket, PolicyDecision, PolicyEngine, PolicyGate,
};
pub use scheduler::TaskRegistry;
pub use security::{SecurityAssessment, SecurityBand, SecurityRequirement, SecurityValidator};
pub use service::{DiscoveryService, DiscoveryServiceBuilder, ScanReport, SystemStatus};
pub use store::{DeviceFilter, DeviceStore, MembershipCounts};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
