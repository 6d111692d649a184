//! Error taxonomy for the discovery subsystem.
//!
//! Scoring and policy outcomes are recorded on device records, never
//! raised as errors. What remains here are the genuinely fallible paths:
//! control-API calls on missing or wrongly-staged devices, integration
//! attempts, and configuration push.

use crate::device::DeviceStatus;
use crate::drivers::{ConfigurationError, IntegrationError};

/// Errors surfaced by the discovery service API.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Device {id} is {actual}, expected {expected}")]
    InvalidState {
        id: String,
        expected: DeviceStatus,
        actual: DeviceStatus,
    },

    #[error("A deep scan is already in progress")]
    ScanInProgress,

    #[error("Service builder error: {0}")]
    Builder(String),

    #[error(transparent)]
    Integration(#[from] IntegrationError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
