//! Collaborator contracts.
//!
//! The orchestration logic is driver-agnostic: radio scanning, integration,
//! registry persistence, configuration push, health probing and traffic
//! analysis are all behind async traits. Production wires real drivers;
//! tests wire deterministic doubles. Every call is wrapped with a timeout
//! by the caller, so a misbehaving driver cannot stall the pipeline.

use async_trait::async_trait;

use crate::device::{DeviceRecord, Protocol, RawDescriptor};

/// How thorough a scan should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDepth {
    /// Frequent, cheap pass
    Shallow,
    /// Infrequent, exhaustive pass
    Deep,
}

/// A protocol scan call failed.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Radio unavailable: {0}")]
    RadioUnavailable(String),

    #[error("Scan timed out")]
    Timeout,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// An integration attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum IntegrationError {
    #[error("Device did not respond")]
    Unresponsive,

    #[error("Integration timed out after {0}ms")]
    Timeout(u64),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Registry error: {0}")]
    Registry(String),
}

/// The configuration collaborator rejected a device.
#[derive(Debug, thiserror::Error)]
#[error("Configuration failed for {device_id}: {message}")]
pub struct ConfigurationError {
    pub device_id: String,
    pub message: String,
}

/// Result of probing an integrated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    /// Degraded or unresponsive, with a description of the issue
    Unhealthy(String),
}

/// Scans one protocol for visible devices.
#[async_trait]
pub trait ProtocolScanner: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Return descriptors for every device currently visible.
    async fn scan(&self, depth: ScanDepth) -> Result<Vec<RawDescriptor>, ScanError>;
}

/// Performs the protocol-level integration handshake.
#[async_trait]
pub trait DeviceIntegrator: Send + Sync {
    /// Integrate a device, returning its connection id.
    async fn integrate(&self, record: &DeviceRecord) -> Result<String, IntegrationError>;
}

/// Persistent device registry (implemented elsewhere).
#[async_trait]
pub trait RegistrySink: Send + Sync {
    async fn register_device(&self, record: &DeviceRecord) -> Result<(), IntegrationError>;
}

/// Pushes runtime configuration to an integrated device.
#[async_trait]
pub trait DeviceConfigurator: Send + Sync {
    async fn configure_device(&self, record: &DeviceRecord) -> Result<(), ConfigurationError>;
}

/// Checks and repairs integrated devices.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check_health(&self, record: &DeviceRecord) -> HealthState;

    /// Attempt a bounded repair. `Ok` means the device recovered.
    async fn attempt_repair(&self, record: &DeviceRecord) -> Result<(), String>;
}

/// Passive traffic analysis surfacing devices invisible to active scans.
#[async_trait]
pub trait TrafficAnalyzer: Send + Sync {
    /// Return candidates observed in traffic that active scans missed.
    async fn analyze_traffic(&self) -> Vec<TrafficCandidate>;

    /// Try to turn a candidate into a full descriptor. `None` means
    /// unidentifiable; the candidate is dropped until more traffic is seen.
    async fn identify_by_traffic(&self, candidate: &TrafficCandidate) -> Option<RawDescriptor>;
}

/// A device inferred from passive traffic observation.
#[derive(Debug, Clone)]
pub struct TrafficCandidate {
    pub mac_address: String,
    /// Best-guess protocol from traffic patterns
    pub protocol: Protocol,
    /// Observed traffic volume in bytes, for prioritization
    pub bytes_observed: u64,
}
