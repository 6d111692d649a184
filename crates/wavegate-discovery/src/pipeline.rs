//! Lifecycle orchestration.
//!
//! The pipeline owns every device record and is the only component that
//! moves devices between lifecycle states. A sighting flows through
//! identification, capability analysis, scoring, security validation and
//! policy, then lands in exactly one of: integrated, pending approval,
//! quarantined, or rejected. Timers and sweeps drive the time-based
//! transitions (quarantine release, pending timeout, stale eviction).

use std::sync::{Arc, OnceLock, Weak};

use chrono::Duration;
use tokio::sync::RwLock;

use wavegate_core::{
    DeviceSummary, DiscoveryConfig, SharedClock, SharedEventBus, WavegateEvent,
};

use crate::capability::CapabilityAnalyzer;
use crate::compat::{weights, CompatibilityScorer};
use crate::device::{DeviceRecord, DeviceStatus, RawDescriptor};
use crate::drivers::{DeviceConfigurator, DeviceIntegrator, IntegrationError, RegistrySink};
use crate::error::{DiscoveryError, Result};
use crate::identify::Identifier;
use crate::policy::{DenialDisposition, PolicyDecision, PolicyEngine};
use crate::security::SecurityValidator;
use crate::store::DeviceStore;

/// Drivers the pipeline calls during integration.
pub struct IntegrationDrivers {
    pub integrator: Arc<dyn DeviceIntegrator>,
    pub registry: Arc<dyn RegistrySink>,
    pub configurator: Arc<dyn DeviceConfigurator>,
}

/// The lifecycle orchestrator.
pub struct DiscoveryPipeline {
    store: DeviceStore,
    identifier: Identifier,
    analyzer: CapabilityAnalyzer,
    scorer: CompatibilityScorer,
    validator: SecurityValidator,
    policy: PolicyEngine,
    drivers: IntegrationDrivers,
    bus: SharedEventBus,
    clock: SharedClock,
    config: Arc<RwLock<DiscoveryConfig>>,
    /// Backreference for one-shot timers; unset in unit tests, where the
    /// periodic sweeps cover the same transitions.
    self_ref: OnceLock<Weak<DiscoveryPipeline>>,
}

impl DiscoveryPipeline {
    pub fn new(
        drivers: IntegrationDrivers,
        bus: SharedEventBus,
        clock: SharedClock,
        config: Arc<RwLock<DiscoveryConfig>>,
    ) -> Self {
        Self {
            store: DeviceStore::new(),
            identifier: Identifier::new(),
            analyzer: CapabilityAnalyzer::new(),
            scorer: CompatibilityScorer::new(),
            validator: SecurityValidator::new(),
            policy: PolicyEngine::new(),
            drivers,
            bus,
            clock,
            config,
            self_ref: OnceLock::new(),
        }
    }

    /// Swap in custom classification tables and policies before start.
    pub fn with_components(
        mut self,
        identifier: Identifier,
        scorer: CompatibilityScorer,
        policy: PolicyEngine,
    ) -> Self {
        self.identifier = identifier;
        self.scorer = scorer;
        self.policy = policy;
        self
    }

    /// Bind the backreference used to arm per-device one-shot timers.
    /// Called once by the service after wrapping the pipeline in an `Arc`.
    pub fn bind(self: &Arc<Self>) {
        let _ = self.self_ref.set(Arc::downgrade(self));
    }

    pub fn store(&self) -> &DeviceStore {
        &self.store
    }

    pub fn config(&self) -> &Arc<RwLock<DiscoveryConfig>> {
        &self.config
    }

    pub fn bus(&self) -> &SharedEventBus {
        &self.bus
    }

    // ── Sighting processing ─────────────────────────────────────────────

    /// Process one sighting. Returns the device id, and whether the
    /// sighting created a new record.
    ///
    /// A repeat sighting never re-triggers classification; it only
    /// refreshes liveness fields.
    pub async fn process_sighting(&self, descriptor: &RawDescriptor) -> (String, bool) {
        let id = descriptor.device_id();
        let now = self.clock.now();

        let refreshed = self
            .store
            .update(&id, |record| record.refresh_sighting(descriptor, now))
            .is_some();
        if refreshed {
            return (id, false);
        }

        let record = self.classify(descriptor);
        if !self.store.insert_new(record.clone()) {
            // Lost a race with a concurrent sighting of the same id.
            self.store
                .update(&id, |record| record.refresh_sighting(descriptor, now));
            return (id, false);
        }

        tracing::info!(
            device_id = %id,
            device_type = %record.device_type,
            protocol = %record.protocol,
            "discovered new device"
        );
        self.bus.publish(WavegateEvent::DeviceDiscovered {
            device: summary(&record),
        });

        self.evaluate_device(&id, false).await;
        (id, true)
    }

    /// Build a classified record from a first sighting.
    fn classify(&self, descriptor: &RawDescriptor) -> DeviceRecord {
        let now = self.clock.now();
        let identification = self.identifier.identify(descriptor);
        let profile = self.analyzer.analyze(descriptor, identification.device_type);

        let mut record = DeviceRecord::from_descriptor(descriptor, now);
        record.name = identification.suggested_name;
        record.device_type = identification.device_type;
        record.manufacturer = identification.manufacturer;
        record.trust_level = identification.trust_level;
        record.certified = identification.certified;
        record.capabilities = profile.capabilities;
        record.security = profile.security;
        record.security.declared_level = identification.security_level;
        record
    }

    /// Score, validate and apply policy to a device, then move it to the
    /// resulting state. `post_quarantine` marks a re-evaluation after a
    /// served quarantine: the device is not quarantined a second time, and
    /// an allowed outcome proceeds straight to integration.
    pub async fn evaluate_device(&self, id: &str, post_quarantine: bool) {
        let Some(record) = self.store.get(id) else {
            return;
        };
        let config = self.config.read().await.clone();
        let now = self.clock.now();

        let report = self.scorer.score(&record, config.auto_integration_enabled);
        let assessment = self.validator.validate(&record, config.security_level);
        self.store.update(id, |r| {
            r.compatibility_score = report.score;
            r.security_score = assessment.score;
            r.integration_priority = report.integration_priority;
        });

        if !report.compatible {
            let reason = report
                .failure_reason
                .unwrap_or_else(|| format!("compatibility score {} below threshold", report.score));
            self.reject(id, &reason).await;
            return;
        }

        if !assessment.valid {
            self.reject(
                id,
                &format!("security band {} below platform minimum", assessment.band),
            )
            .await;
            return;
        }

        match self.policy.evaluate(&record, assessment.band, now) {
            PolicyDecision::Deny {
                reason,
                disposition: DenialDisposition::Reject,
                ..
            } => {
                self.reject(id, &reason).await;
            }
            PolicyDecision::Deny {
                reason,
                disposition: DenialDisposition::QueueForApproval,
                ..
            } => {
                self.queue_for_approval(id, report.score, &reason).await;
            }
            PolicyDecision::AllowWithQuarantine { quarantine_secs } if !post_quarantine => {
                self.quarantine(id, quarantine_secs).await;
            }
            PolicyDecision::Allow | PolicyDecision::AllowWithQuarantine { .. } => {
                if report.auto_integrate || post_quarantine {
                    let _ = self.integrate_device(id).await;
                } else {
                    self.queue_for_approval(id, report.score, "manual approval required")
                        .await;
                }
            }
        }
    }

    // ── State transitions ───────────────────────────────────────────────

    async fn reject(&self, id: &str, reason: &str) {
        let now = self.clock.now();
        let record = self.store.update(id, |r| {
            r.status = DeviceStatus::Rejected;
            r.rejected_at = Some(now);
            r.rejection_reason = Some(reason.to_string());
            r.pending_since = None;
            r.quarantine_until = None;
            r.clone()
        });
        if let Some(record) = record {
            tracing::info!(device_id = %id, reason, "device rejected");
            self.bus.publish(WavegateEvent::DeviceRejected {
                device: summary(&record),
                reason: reason.to_string(),
            });
        }
    }

    async fn queue_for_approval(&self, id: &str, score: u8, reason: &str) {
        let now = self.clock.now();
        let record = self.store.update(id, |r| {
            r.status = DeviceStatus::PendingApproval;
            r.pending_since = Some(now);
            r.clone()
        });
        if let Some(record) = record {
            tracing::info!(device_id = %id, reason, "device queued for approval");
            self.bus.publish(WavegateEvent::DevicePendingApproval {
                device: summary(&record),
                compatibility_score: score,
            });
            let timeout = self.config.read().await.pending_timeout();
            self.arm_timer(id, timeout, TimerKind::PendingTimeout);
        }
    }

    async fn quarantine(&self, id: &str, quarantine_secs: i64) {
        let now = self.clock.now();
        let until = now + Duration::seconds(quarantine_secs);
        let record = self.store.update(id, |r| {
            r.status = DeviceStatus::Quarantined;
            r.quarantine_until = Some(until);
            r.clone()
        });
        if let Some(record) = record {
            let reason = "policy quarantine before integration".to_string();
            tracing::info!(device_id = %id, quarantine_secs, "device quarantined");
            self.bus.publish(WavegateEvent::DeviceQuarantined {
                device: summary(&record),
                quarantine_secs,
                reason,
            });
            self.arm_timer(id, Duration::seconds(quarantine_secs), TimerKind::QuarantineRelease);
        }
    }

    /// Attempt integration for a device. On success the device becomes
    /// `Integrated`; on failure it returns to `Discovered` for retry on a
    /// later cycle and an `integration_failed` event is published.
    ///
    /// Configuration errors propagate so `approve_device` and
    /// `force_integrate_device` callers see them.
    pub async fn integrate_device(&self, id: &str) -> Result<()> {
        let record = self
            .store
            .update(id, |r| {
                r.status = DeviceStatus::Integrating;
                r.pending_since = None;
                r.quarantine_until = None;
                r.clone()
            })
            .ok_or_else(|| DiscoveryError::NotFound(id.to_string()))?;

        let timeout_ms = self.config.read().await.integration_timeout_ms;
        let budget = std::time::Duration::from_millis(timeout_ms);

        let outcome = match tokio::time::timeout(
            budget,
            self.drivers.integrator.integrate(&record),
        )
        .await
        {
            Err(_) => Err(IntegrationError::Timeout(timeout_ms)),
            Ok(result) => result,
        };

        let connection_id = match outcome {
            Ok(connection_id) => connection_id,
            Err(err) => {
                self.fail_integration(id, &record, &err.to_string()).await;
                return Err(err.into());
            }
        };

        if let Err(err) = self.drivers.registry.register_device(&record).await {
            self.fail_integration(id, &record, &err.to_string()).await;
            return Err(err.into());
        }

        if let Err(err) = self.drivers.configurator.configure_device(&record).await {
            self.fail_integration(id, &record, &err.to_string()).await;
            return Err(err.into());
        }

        let now = self.clock.now();
        let integrated = self.store.update(id, |r| {
            r.status = DeviceStatus::Integrated;
            r.connection_id = Some(connection_id.clone());
            r.unreachable = false;
            r.last_seen = now;
            r.rejected_at = None;
            r.rejection_reason = None;
            r.clone()
        });
        if let Some(record) = integrated {
            self.policy.record_admission(&record, now);
            tracing::info!(device_id = %id, connection_id, "device integrated");
            self.bus.publish(WavegateEvent::DeviceIntegrated {
                device: summary(&record),
            });
        }
        Ok(())
    }

    async fn fail_integration(&self, id: &str, record: &DeviceRecord, error: &str) {
        self.store.update(id, |r| {
            r.status = DeviceStatus::Discovered;
            r.connection_id = None;
        });
        tracing::warn!(device_id = %id, error, "integration failed, device returns to discovered");
        self.bus.publish(WavegateEvent::IntegrationFailed {
            device: summary(record),
            error: error.to_string(),
        });
    }

    // ── Control API ─────────────────────────────────────────────────────

    /// Approve a pending device and integrate it.
    pub async fn approve_device(&self, id: &str) -> Result<()> {
        let record = self
            .store
            .get(id)
            .ok_or_else(|| DiscoveryError::NotFound(id.to_string()))?;
        if record.status != DeviceStatus::PendingApproval {
            return Err(DiscoveryError::InvalidState {
                id: id.to_string(),
                expected: DeviceStatus::PendingApproval,
                actual: record.status,
            });
        }
        self.integrate_device(id).await
    }

    /// Manually reject a device with a reason.
    pub async fn reject_device_manually(&self, id: &str, reason: &str) -> Result<()> {
        let record = self
            .store
            .get(id)
            .ok_or_else(|| DiscoveryError::NotFound(id.to_string()))?;
        if record.status == DeviceStatus::Integrated {
            return Err(DiscoveryError::InvalidState {
                id: id.to_string(),
                expected: DeviceStatus::Discovered,
                actual: record.status,
            });
        }
        self.reject(id, reason).await;
        Ok(())
    }

    /// Integrate a device regardless of its scores and policy outcome.
    pub async fn force_integrate_device(&self, id: &str) -> Result<()> {
        let record = self
            .store
            .get(id)
            .ok_or_else(|| DiscoveryError::NotFound(id.to_string()))?;
        if record.status == DeviceStatus::Integrated {
            return Ok(());
        }
        self.integrate_device(id).await
    }

    // ── Time-based sweeps ───────────────────────────────────────────────

    /// Release quarantined devices whose timer has elapsed. Each released
    /// device re-enters the integration attempt after a fresh policy
    /// evaluation against current configuration. Returns how many were
    /// released.
    pub async fn release_due_quarantines(&self) -> usize {
        let now = self.clock.now();
        let due = self.store.ids_where(|r| {
            r.status == DeviceStatus::Quarantined
                && r.quarantine_until.is_some_and(|until| until <= now)
        });
        for id in &due {
            tracing::info!(device_id = %id, "quarantine elapsed, re-entering integration");
            self.store.update(id, |r| {
                r.status = DeviceStatus::Discovered;
                r.quarantine_until = None;
            });
            self.evaluate_device(id, true).await;
        }
        due.len()
    }

    /// Reject devices pending approval longer than the configured timeout.
    /// Returns how many timed out.
    pub async fn expire_stale_pending(&self) -> usize {
        let now = self.clock.now();
        let timeout = self.config.read().await.pending_timeout();
        let stale = self.store.ids_where(|r| {
            r.status == DeviceStatus::PendingApproval
                && r.pending_since.is_some_and(|since| now - since >= timeout)
        });
        for id in &stale {
            self.reject(id, "timeout").await;
        }
        stale.len()
    }

    /// Re-attempt integration for compatible devices parked in
    /// `Discovered` after an earlier failure.
    pub async fn retry_failed_integrations(&self) -> usize {
        let candidates = self.store.ids_where(|r| {
            r.status == DeviceStatus::Discovered
                && r.compatibility_score >= weights::COMPATIBLE_THRESHOLD
        });
        for id in &candidates {
            self.evaluate_device(id, false).await;
        }
        candidates.len()
    }

    /// Evict stale records: discovered devices unsighted beyond the
    /// retention window, and rejected records older than the window.
    /// Devices are never evicted mid-processing, and never while
    /// integrated, pending or serving quarantine.
    pub async fn cleanup_stale(&self) -> usize {
        let now = self.clock.now();
        let retention = self.config.read().await.retention();
        let stale = self.store.ids_where(|r| match r.status {
            DeviceStatus::Discovered => now - r.last_seen >= retention,
            DeviceStatus::Rejected => r
                .rejected_at
                .is_some_and(|rejected| now - rejected >= retention),
            _ => false,
        });
        for id in &stale {
            if let Some(record) = self.store.remove(id) {
                tracing::debug!(device_id = %id, status = %record.status, "evicted stale record");
            }
        }
        stale.len()
    }

    // ── One-shot timers ─────────────────────────────────────────────────

    fn arm_timer(&self, id: &str, delay: Duration, kind: TimerKind) {
        let Some(weak) = self.self_ref.get() else {
            // Not bound (unit tests); periodic sweeps handle the transition.
            return;
        };
        let weak = weak.clone();
        let id = id.to_string();
        let delay = delay.to_std().unwrap_or_default();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(pipeline) = weak.upgrade() else {
                return;
            };
            match kind {
                TimerKind::QuarantineRelease => {
                    pipeline.release_due_quarantines().await;
                }
                TimerKind::PendingTimeout => {
                    pipeline.expire_stale_pending().await;
                }
            }
        });
    }
}

#[derive(Debug, Clone, Copy)]
enum TimerKind {
    QuarantineRelease,
    PendingTimeout,
}

/// Event payload view of a record.
pub(crate) fn summary(record: &DeviceRecord) -> DeviceSummary {
    DeviceSummary {
        device_id: record.id.clone(),
        name: record.name.clone(),
        device_type: record.device_type.to_string(),
        protocol: record.protocol.to_string(),
        manufacturer: record.manufacturer.clone(),
    }
}
