//! Core traits and types for Wavegate.
//!
//! This crate defines the foundational abstractions shared by the platform:
//! the event bus that components communicate over, the runtime configuration
//! for the discovery pipeline, and the clock abstraction that lets
//! time-dependent policy logic run against a controlled clock in tests.

pub mod clock;
pub mod config;
pub mod event;
pub mod eventbus;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{ConfigPatch, DiscoveryConfig, MinimumSecurityLevel};
pub use event::{DeviceSummary, EventMetadata, ScanType, WavegateEvent};
pub use eventbus::{
    DEFAULT_CHANNEL_CAPACITY, EventBus, EventBusReceiver, FilteredReceiver, SharedEventBus,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install a `tracing` subscriber reading the `RUST_LOG` filter.
///
/// Safe to call more than once; only the first call wins.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
