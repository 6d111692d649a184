//! The discovery service.
//!
//! Wires the pipeline, health monitor and drivers together, drives the
//! four periodic tasks (shallow scan, deep scan, health sweep, cleanup)
//! through the task registry, and exposes the operator control API.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use wavegate_core::{
    ConfigPatch, DiscoveryConfig, EventBus, ScanType, SharedClock, SharedEventBus, SystemClock,
    WavegateEvent,
};

use crate::compat::CompatibilityScorer;
use crate::device::DeviceRecord;
use crate::drivers::{
    DeviceConfigurator, DeviceIntegrator, HealthProbe, ProtocolScanner, RegistrySink, ScanDepth,
    TrafficAnalyzer,
};
use crate::error::{DiscoveryError, Result};
use crate::identify::Identifier;
use crate::monitor::HealthMonitor;
use crate::pipeline::{DiscoveryPipeline, IntegrationDrivers};
use crate::policy::PolicyEngine;
use crate::scheduler::TaskRegistry;
use crate::store::{DeviceFilter, MembershipCounts};

/// Snapshot returned by `system_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub counts: MembershipCounts,
    pub config: DiscoveryConfig,
    pub started_at: DateTime<Utc>,
    pub deep_scan_in_progress: bool,
    pub background_tasks: Vec<String>,
}

/// Result of one scan cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub scan_type: ScanType,
    pub duration_ms: u64,
    /// Devices seen this cycle that were not known before
    pub devices_found: usize,
}

/// Builder for [`DiscoveryService`].
#[derive(Default)]
pub struct DiscoveryServiceBuilder {
    scanners: Vec<Arc<dyn ProtocolScanner>>,
    traffic: Option<Arc<dyn TrafficAnalyzer>>,
    integrator: Option<Arc<dyn DeviceIntegrator>>,
    registry: Option<Arc<dyn RegistrySink>>,
    configurator: Option<Arc<dyn DeviceConfigurator>>,
    probe: Option<Arc<dyn HealthProbe>>,
    bus: Option<SharedEventBus>,
    clock: Option<SharedClock>,
    config: Option<DiscoveryConfig>,
    identifier: Option<Identifier>,
    scorer: Option<CompatibilityScorer>,
    policy: Option<PolicyEngine>,
}

impl DiscoveryServiceBuilder {
    pub fn scanner(mut self, scanner: Arc<dyn ProtocolScanner>) -> Self {
        self.scanners.push(scanner);
        self
    }

    pub fn traffic_analyzer(mut self, analyzer: Arc<dyn TrafficAnalyzer>) -> Self {
        self.traffic = Some(analyzer);
        self
    }

    pub fn integrator(mut self, integrator: Arc<dyn DeviceIntegrator>) -> Self {
        self.integrator = Some(integrator);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn RegistrySink>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn configurator(mut self, configurator: Arc<dyn DeviceConfigurator>) -> Self {
        self.configurator = Some(configurator);
        self
    }

    pub fn health_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn event_bus(mut self, bus: SharedEventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(mut self, config: DiscoveryConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn identifier(mut self, identifier: Identifier) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn scorer(mut self, scorer: CompatibilityScorer) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn policy_engine(mut self, policy: PolicyEngine) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Build the service. Integration drivers and a health probe are
    /// required; everything else has a default.
    pub fn build(self) -> Result<DiscoveryService> {
        let missing = |what: &str| DiscoveryError::Builder(format!("missing {what}"));

        let integrator = self.integrator.ok_or_else(|| missing("integrator"))?;
        let registry = self.registry.ok_or_else(|| missing("registry"))?;
        let configurator = self.configurator.ok_or_else(|| missing("configurator"))?;
        let probe = self.probe.ok_or_else(|| missing("health probe"))?;

        let bus = self.bus.unwrap_or_else(|| Arc::new(EventBus::new()));
        let clock: SharedClock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let config = Arc::new(RwLock::new(self.config.unwrap_or_default()));

        let mut pipeline = DiscoveryPipeline::new(
            IntegrationDrivers {
                integrator,
                registry,
                configurator,
            },
            bus.clone(),
            clock.clone(),
            config.clone(),
        );
        if self.identifier.is_some() || self.scorer.is_some() || self.policy.is_some() {
            pipeline = pipeline.with_components(
                self.identifier.unwrap_or_default(),
                self.scorer.unwrap_or_default(),
                self.policy.unwrap_or_default(),
            );
        }

        let pipeline = Arc::new(pipeline);
        pipeline.bind();
        let monitor = Arc::new(HealthMonitor::new(pipeline.clone(), probe));

        Ok(DiscoveryService {
            runner: Arc::new(ScanRunner {
                scanners: self.scanners,
                traffic: self.traffic,
                pipeline: pipeline.clone(),
                bus: bus.clone(),
                config: config.clone(),
                deep_scan_in_progress: AtomicBool::new(false),
            }),
            pipeline,
            monitor,
            bus,
            config,
            tasks: TaskRegistry::new(),
            started_at: clock.now(),
            clock,
        })
    }
}

/// Top-level handle for the discovery and onboarding pipeline.
pub struct DiscoveryService {
    pipeline: Arc<DiscoveryPipeline>,
    monitor: Arc<HealthMonitor>,
    runner: Arc<ScanRunner>,
    bus: SharedEventBus,
    clock: SharedClock,
    config: Arc<RwLock<DiscoveryConfig>>,
    tasks: TaskRegistry,
    started_at: DateTime<Utc>,
}

impl DiscoveryService {
    pub fn builder() -> DiscoveryServiceBuilder {
        DiscoveryServiceBuilder::default()
    }

    pub fn event_bus(&self) -> &SharedEventBus {
        &self.bus
    }

    pub fn pipeline(&self) -> &Arc<DiscoveryPipeline> {
        &self.pipeline
    }

    /// Start the background schedule: shallow scan, deep scan, health
    /// sweep and stale-record cleanup. Intervals are re-read every tick,
    /// so configuration updates apply from the next cycle.
    pub fn start(&self) {
        tracing::info!("discovery service starting background tasks");

        let runner = self.runner.clone();
        let config = self.config.clone();
        self.tasks.spawn_periodic(
            "shallow_scan",
            move || {
                let config = config.clone();
                async move {
                    std::time::Duration::from_secs(config.read().await.scan_interval_secs)
                }
            },
            move || {
                let runner = runner.clone();
                async move {
                    runner.run_scan(ScanType::Shallow).await;
                }
            },
        );

        let runner = self.runner.clone();
        let config = self.config.clone();
        self.tasks.spawn_periodic(
            "deep_scan",
            move || {
                let config = config.clone();
                async move {
                    std::time::Duration::from_secs(config.read().await.deep_scan_interval_secs)
                }
            },
            move || {
                let runner = runner.clone();
                async move {
                    runner.run_scan(ScanType::Deep).await;
                }
            },
        );

        let pipeline = self.pipeline.clone();
        let monitor = self.monitor.clone();
        let config = self.config.clone();
        self.tasks.spawn_periodic(
            "health_sweep",
            move || {
                let config = config.clone();
                async move {
                    std::time::Duration::from_secs(config.read().await.health_check_interval_secs)
                }
            },
            move || {
                let pipeline = pipeline.clone();
                let monitor = monitor.clone();
                async move {
                    // Backstop for the per-device one-shot timers.
                    pipeline.release_due_quarantines().await;
                    pipeline.expire_stale_pending().await;
                    pipeline.retry_failed_integrations().await;
                    monitor.sweep().await;
                }
            },
        );

        let pipeline = self.pipeline.clone();
        let config = self.config.clone();
        self.tasks.spawn_periodic(
            "cleanup",
            move || {
                let config = config.clone();
                async move {
                    std::time::Duration::from_secs(config.read().await.cleanup_interval_secs)
                }
            },
            move || {
                let pipeline = pipeline.clone();
                async move {
                    let evicted = pipeline.cleanup_stale().await;
                    if evicted > 0 {
                        tracing::info!(evicted, "cleanup evicted stale records");
                    }
                }
            },
        );
    }

    /// Stop all background tasks.
    pub async fn shutdown(&self) {
        tracing::info!("discovery service shutting down");
        self.tasks.shutdown().await;
    }

    // ── Control API ─────────────────────────────────────────────────────

    pub async fn system_status(&self) -> SystemStatus {
        SystemStatus {
            counts: self.pipeline.store().counts(),
            config: self.config.read().await.clone(),
            started_at: self.started_at,
            deep_scan_in_progress: self.runner.deep_scan_in_progress.load(Ordering::SeqCst),
            background_tasks: self.tasks.task_names(),
        }
    }

    pub fn discovered_devices(&self, filter: &DeviceFilter) -> Vec<DeviceRecord> {
        self.pipeline
            .store()
            .list(crate::device::Membership::Discovered, filter)
    }

    pub fn integrated_devices(&self, filter: &DeviceFilter) -> Vec<DeviceRecord> {
        self.pipeline
            .store()
            .list(crate::device::Membership::Integrated, filter)
    }

    pub fn pending_devices(&self) -> Vec<DeviceRecord> {
        self.pipeline
            .store()
            .list(crate::device::Membership::Pending, &DeviceFilter::default())
    }

    pub async fn approve_device(&self, id: &str) -> Result<()> {
        self.pipeline.approve_device(id).await
    }

    pub async fn reject_device_manually(&self, id: &str, reason: &str) -> Result<()> {
        self.pipeline.reject_device_manually(id, reason).await
    }

    pub async fn force_integrate_device(&self, id: &str) -> Result<()> {
        self.pipeline.force_integrate_device(id).await
    }

    /// Run a deep scan now. Fails if one is already in progress.
    pub async fn trigger_manual_scan(&self) -> Result<ScanReport> {
        self.runner
            .run_scan(ScanType::Manual)
            .await
            .ok_or(DiscoveryError::ScanInProgress)
    }

    /// Apply a configuration patch; takes effect on the next tick of each
    /// background task.
    pub async fn update_configuration(&self, patch: &ConfigPatch) {
        let mut config = self.config.write().await;
        config.apply(patch);
        tracing::info!(?patch, "configuration updated");
    }

    pub fn uptime(&self) -> chrono::Duration {
        self.clock.now() - self.started_at
    }
}

/// Owns the scan loop and the deep-scan mutual-exclusion guard.
struct ScanRunner {
    scanners: Vec<Arc<dyn ProtocolScanner>>,
    traffic: Option<Arc<dyn TrafficAnalyzer>>,
    pipeline: Arc<DiscoveryPipeline>,
    bus: SharedEventBus,
    config: Arc<RwLock<DiscoveryConfig>>,
    deep_scan_in_progress: AtomicBool,
}

impl ScanRunner {
    /// Run one scan cycle. Returns `None` when a deep/manual scan was
    /// skipped because another deep scan holds the guard.
    async fn run_scan(&self, scan_type: ScanType) -> Option<ScanReport> {
        let deep = !matches!(scan_type, ScanType::Shallow);
        if deep
            && self
                .deep_scan_in_progress
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            tracing::debug!(%scan_type, "deep scan already in progress, skipping");
            return None;
        }

        let started = std::time::Instant::now();
        let depth = if deep { ScanDepth::Deep } else { ScanDepth::Shallow };
        let timeout_ms = self.config.read().await.scan_call_timeout_ms;
        let budget = std::time::Duration::from_millis(timeout_ms);
        let mut devices_found = 0usize;

        for scanner in &self.scanners {
            let protocol = scanner.protocol();
            match tokio::time::timeout(budget, scanner.scan(depth)).await {
                Ok(Ok(descriptors)) => {
                    // Incremental processing: one device at a time, so a
                    // single misbehaving device cannot stall the cycle.
                    for descriptor in descriptors {
                        let (_, new) = self.pipeline.process_sighting(&descriptor).await;
                        if new {
                            devices_found += 1;
                        }
                    }
                }
                Ok(Err(err)) => {
                    tracing::warn!(%protocol, error = %err, "protocol scan failed");
                }
                Err(_) => {
                    tracing::warn!(%protocol, "protocol scan timed out");
                }
            }
        }

        if deep {
            devices_found += self.analyze_traffic(budget).await;
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        self.bus.publish(WavegateEvent::ScanCompleted {
            scan_type,
            duration_ms,
            devices_found,
        });

        if deep {
            self.deep_scan_in_progress.store(false, Ordering::SeqCst);
        }

        Some(ScanReport {
            scan_type,
            duration_ms,
            devices_found,
        })
    }

    /// Surface devices only visible in passive traffic.
    async fn analyze_traffic(&self, budget: std::time::Duration) -> usize {
        let Some(traffic) = &self.traffic else {
            return 0;
        };

        let candidates = match tokio::time::timeout(budget, traffic.analyze_traffic()).await {
            Ok(candidates) => candidates,
            Err(_) => {
                tracing::warn!("traffic analysis timed out");
                return 0;
            }
        };

        let mut found = 0;
        for candidate in candidates {
            let descriptor =
                match tokio::time::timeout(budget, traffic.identify_by_traffic(&candidate)).await {
                    Ok(Some(descriptor)) => descriptor,
                    // Unidentifiable: dropped until more traffic is seen.
                    Ok(None) => continue,
                    Err(_) => continue,
                };
            let (_, new) = self.pipeline.process_sighting(&descriptor).await;
            if new {
                found += 1;
            }
        }
        found
    }
}
