//! Health monitoring for integrated devices.
//!
//! Each sweep checks reachability of every integrated device, attempts a
//! bounded repair on failure, and flags devices that stay unreachable.
//! Unreachable devices are not removed from the integrated set; recovery
//! beyond repair is an operator concern.

use std::sync::Arc;

use wavegate_core::WavegateEvent;

use crate::device::DeviceStatus;
use crate::drivers::{HealthProbe, HealthState};
use crate::pipeline::{summary, DiscoveryPipeline};

/// Repair attempts per sweep before a device is flagged unreachable.
const MAX_REPAIR_ATTEMPTS: usize = 2;

/// Sweeps integrated devices for reachability.
pub struct HealthMonitor {
    pipeline: Arc<DiscoveryPipeline>,
    probe: Arc<dyn HealthProbe>,
}

impl HealthMonitor {
    pub fn new(pipeline: Arc<DiscoveryPipeline>, probe: Arc<dyn HealthProbe>) -> Self {
        Self { pipeline, probe }
    }

    /// Check every integrated device once. Returns how many devices were
    /// newly flagged unreachable.
    pub async fn sweep(&self) -> usize {
        let store = self.pipeline.store();
        let timeout_ms = self.pipeline.config().read().await.health_call_timeout_ms;
        let budget = std::time::Duration::from_millis(timeout_ms);

        let ids = store.ids_where(|r| r.status == DeviceStatus::Integrated);
        let mut newly_unreachable = 0;

        // One device at a time: a stuck probe burns its own timeout, not
        // the whole sweep.
        for id in ids {
            let Some(record) = store.get(&id) else {
                continue;
            };

            let health = match tokio::time::timeout(budget, self.probe.check_health(&record)).await
            {
                Ok(state) => state,
                Err(_) => HealthState::Unhealthy("health check timed out".to_string()),
            };

            match health {
                HealthState::Healthy => {
                    store.update(&id, |r| r.unreachable = false);
                }
                HealthState::Unhealthy(issue) => {
                    if self.try_repair(&id, budget).await {
                        tracing::info!(device_id = %id, "device repaired");
                        store.update(&id, |r| r.unreachable = false);
                        continue;
                    }

                    let was_reachable = store
                        .update(&id, |r| {
                            let was = !r.unreachable;
                            r.unreachable = true;
                            was
                        })
                        .unwrap_or(false);
                    if was_reachable {
                        newly_unreachable += 1;
                        tracing::warn!(device_id = %id, issue, "device unreachable");
                        self.pipeline.bus().publish(WavegateEvent::DeviceUnreachable {
                            device: summary(&record),
                            issue,
                        });
                    }
                }
            }
        }

        newly_unreachable
    }

    async fn try_repair(&self, id: &str, budget: std::time::Duration) -> bool {
        let Some(record) = self.pipeline.store().get(id) else {
            return false;
        };
        for attempt in 1..=MAX_REPAIR_ATTEMPTS {
            match tokio::time::timeout(budget, self.probe.attempt_repair(&record)).await {
                Ok(Ok(())) => return true,
                Ok(Err(err)) => {
                    tracing::debug!(device_id = %id, attempt, error = %err, "repair attempt failed");
                }
                Err(_) => {
                    tracing::debug!(device_id = %id, attempt, "repair attempt timed out");
                }
            }
        }
        false
    }
}
