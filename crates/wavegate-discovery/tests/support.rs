//! Deterministic driver doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use wavegate_core::{DiscoveryConfig, EventBus, ManualClock, SharedEventBus};
use wavegate_discovery::{
    ConfigurationError, DeviceConfigurator, DeviceIntegrator, DeviceRecord, DiscoveryService,
    HealthProbe, HealthState, IntegrationError, Protocol, ProtocolScanner, RawDescriptor,
    RegistrySink, ScanDepth, ScanError, TrafficAnalyzer, TrafficCandidate,
};

/// Scanner returning a fixed set of descriptors on every call.
pub struct FixedScanner {
    protocol: Protocol,
    descriptors: Mutex<Vec<RawDescriptor>>,
    pub scan_count: AtomicUsize,
}

impl FixedScanner {
    pub fn new(protocol: Protocol, descriptors: Vec<RawDescriptor>) -> Self {
        Self {
            protocol,
            descriptors: Mutex::new(descriptors),
            scan_count: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ProtocolScanner for FixedScanner {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    async fn scan(&self, _depth: ScanDepth) -> Result<Vec<RawDescriptor>, ScanError> {
        self.scan_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.descriptors.lock().clone())
    }
}

/// Scanner that holds its scan call open for a fixed delay.
pub struct SlowScanner {
    protocol: Protocol,
    delay: std::time::Duration,
}

impl SlowScanner {
    pub fn new(protocol: Protocol, delay: std::time::Duration) -> Self {
        Self { protocol, delay }
    }
}

#[async_trait]
impl ProtocolScanner for SlowScanner {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    async fn scan(&self, _depth: ScanDepth) -> Result<Vec<RawDescriptor>, ScanError> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }
}

/// Scanner whose radio is down.
pub struct FailingScanner {
    protocol: Protocol,
}

impl FailingScanner {
    pub fn new(protocol: Protocol) -> Self {
        Self { protocol }
    }
}

#[async_trait]
impl ProtocolScanner for FailingScanner {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    async fn scan(&self, _depth: ScanDepth) -> Result<Vec<RawDescriptor>, ScanError> {
        Err(ScanError::RadioUnavailable("antenna offline".to_string()))
    }
}

/// Integrator with a switchable outcome; records every call.
pub struct ScriptedIntegrator {
    pub succeed: AtomicBool,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedIntegrator {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            succeed: AtomicBool::new(true),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            succeed: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl DeviceIntegrator for ScriptedIntegrator {
    async fn integrate(&self, record: &DeviceRecord) -> Result<String, IntegrationError> {
        self.calls.lock().push(record.id.clone());
        if self.succeed.load(Ordering::SeqCst) {
            Ok(format!("conn-{}", record.id))
        } else {
            Err(IntegrationError::Unresponsive)
        }
    }
}

/// Registry sink that records registered ids.
#[derive(Default)]
pub struct RecordingRegistry {
    pub registered: Mutex<Vec<String>>,
}

#[async_trait]
impl RegistrySink for RecordingRegistry {
    async fn register_device(&self, record: &DeviceRecord) -> Result<(), IntegrationError> {
        self.registered.lock().push(record.id.clone());
        Ok(())
    }
}

/// Configurator with a switchable outcome.
pub struct ScriptedConfigurator {
    pub succeed: AtomicBool,
}

impl ScriptedConfigurator {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            succeed: AtomicBool::new(true),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            succeed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl DeviceConfigurator for ScriptedConfigurator {
    async fn configure_device(&self, record: &DeviceRecord) -> Result<(), ConfigurationError> {
        if self.succeed.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ConfigurationError {
                device_id: record.id.clone(),
                message: "device refused configuration".to_string(),
            })
        }
    }
}

/// Probe with switchable health and repairability.
pub struct ScriptedProbe {
    pub healthy: AtomicBool,
    pub repairable: AtomicBool,
}

impl ScriptedProbe {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(true),
            repairable: AtomicBool::new(true),
        })
    }

    pub fn broken(repairable: bool) -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(false),
            repairable: AtomicBool::new(repairable),
        })
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn check_health(&self, _record: &DeviceRecord) -> HealthState {
        if self.healthy.load(Ordering::SeqCst) {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy("no response to ping".to_string())
        }
    }

    async fn attempt_repair(&self, _record: &DeviceRecord) -> Result<(), String> {
        if self.repairable.load(Ordering::SeqCst) {
            self.healthy.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            Err("reconnect failed".to_string())
        }
    }
}

/// Traffic analyzer surfacing one scripted candidate.
pub struct ScriptedTraffic {
    pub candidate: TrafficCandidate,
    pub descriptor: Option<RawDescriptor>,
}

#[async_trait]
impl TrafficAnalyzer for ScriptedTraffic {
    async fn analyze_traffic(&self) -> Vec<TrafficCandidate> {
        vec![self.candidate.clone()]
    }

    async fn identify_by_traffic(&self, _candidate: &TrafficCandidate) -> Option<RawDescriptor> {
        self.descriptor.clone()
    }
}

// ── Fixtures ────────────────────────────────────────────────────────────

/// Zigbee climate sensor from a known, certified family; scores high and
/// auto-integrates under default rules.
pub fn aria_sensor() -> RawDescriptor {
    RawDescriptor::new(Protocol::Zigbee, "0x4431")
        .with_mac("54:EF:44:AA:10:01")
        .with_name("Hall Climate Sensor")
        .with_services(vec![
            "battery_service".to_string(),
            "temperature_measurement".to_string(),
        ])
        .with_rssi(-55)
}

/// WiFi doorbell camera from a verified family; compatible but the camera
/// rule never auto-integrates.
pub fn sentine_camera() -> RawDescriptor {
    RawDescriptor::new(Protocol::Wifi, "192.168.1.31")
        .with_mac("9C:76:13:00:42:07")
        .with_model("Sentine DB-2")
        .with_name("Front Door Cam")
        .with_services(vec![
            "sentine_stream".to_string(),
            "motion_events".to_string(),
        ])
        .with_rssi(-48)
}

/// BLE advertisement that matches nothing; classifies as unknown.
pub fn mystery_ble() -> RawDescriptor {
    RawDescriptor::new(Protocol::Ble, "D4:00:00:12:34:56").with_rssi(-82)
}

// ── Harness ─────────────────────────────────────────────────────────────

pub struct Harness {
    pub service: DiscoveryService,
    pub clock: Arc<ManualClock>,
    pub integrator: Arc<ScriptedIntegrator>,
    pub registry: Arc<RecordingRegistry>,
    pub configurator: Arc<ScriptedConfigurator>,
    pub probe: Arc<ScriptedProbe>,
    pub bus: SharedEventBus,
}

/// Build a service with a manual clock and succeeding drivers.
pub fn harness(scanners: Vec<Arc<dyn ProtocolScanner>>) -> Harness {
    build_harness(scanners, DiscoveryConfig::default(), None)
}

pub fn harness_with_config(
    scanners: Vec<Arc<dyn ProtocolScanner>>,
    config: DiscoveryConfig,
) -> Harness {
    build_harness(scanners, config, None)
}

pub fn harness_with_policy(
    scanners: Vec<Arc<dyn ProtocolScanner>>,
    policy: wavegate_discovery::PolicyEngine,
) -> Harness {
    build_harness(scanners, DiscoveryConfig::default(), Some(policy))
}

fn build_harness(
    scanners: Vec<Arc<dyn ProtocolScanner>>,
    config: DiscoveryConfig,
    policy: Option<wavegate_discovery::PolicyEngine>,
) -> Harness {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let integrator = ScriptedIntegrator::succeeding();
    let registry = Arc::new(RecordingRegistry::default());
    let configurator = ScriptedConfigurator::succeeding();
    let probe = ScriptedProbe::healthy();
    let bus: SharedEventBus = Arc::new(EventBus::new());

    let mut builder = DiscoveryService::builder()
        .integrator(integrator.clone())
        .registry(registry.clone())
        .configurator(configurator.clone())
        .health_probe(probe.clone())
        .event_bus(bus.clone())
        .clock(clock.clone())
        .config(config);
    if let Some(policy) = policy {
        builder = builder.policy_engine(policy);
    }
    for scanner in scanners {
        builder = builder.scanner(scanner);
    }

    let service = builder.build().expect("service builds");
    Harness {
        service,
        clock,
        integrator,
        registry,
        configurator,
        probe,
        bus,
    }
}

/// Collect the event names already sitting in a receiver.
pub fn drain_event_names(rx: &mut wavegate_core::EventBusReceiver) -> Vec<&'static str> {
    let mut names = Vec::new();
    while let Some((event, _)) = rx.try_recv() {
        names.push(event.name());
    }
    names
}
