//! End-to-end onboarding flows: sighting → classification → scoring →
//! policy → lifecycle state.

mod support;

use wavegate_core::DiscoveryConfig;
use wavegate_discovery::{DeviceStatus, DeviceType, Membership, Protocol, RawDescriptor};

use support::*;

#[tokio::test]
async fn known_sensor_is_auto_integrated() {
    let h = harness(vec![]);
    let mut rx = h.bus.subscribe();
    let pipeline = h.service.pipeline();

    let (id, new) = pipeline.process_sighting(&aria_sensor()).await;
    assert!(new);

    let record = pipeline.store().get(&id).unwrap();
    assert_eq!(record.status, DeviceStatus::Integrated);
    assert_eq!(record.device_type, DeviceType::Sensor);
    assert_eq!(record.manufacturer, "aria");
    assert!(record.compatibility_score >= 85, "score was {}", record.compatibility_score);
    assert_eq!(record.connection_id.as_deref(), Some(format!("conn-{id}").as_str()));

    assert_eq!(h.integrator.calls.lock().as_slice(), [id.clone()]);
    assert_eq!(h.registry.registered.lock().as_slice(), [id]);

    let names = drain_event_names(&mut rx);
    assert_eq!(names, ["device_discovered", "device_integrated"]);
}

#[tokio::test]
async fn security_camera_is_quarantined_not_integrated() {
    let h = harness(vec![]);
    let mut rx = h.bus.subscribe();
    let pipeline = h.service.pipeline();

    let (id, _) = pipeline.process_sighting(&sentine_camera()).await;

    let record = pipeline.store().get(&id).unwrap();
    assert_eq!(record.status, DeviceStatus::Quarantined);
    assert!(record.quarantine_until.is_some());
    assert!(record.compatibility_score >= 70);
    // Quarantined devices still count as discovered, not integrated.
    assert_eq!(record.membership(), Membership::Discovered);
    assert!(h.integrator.calls.lock().is_empty());

    let names = drain_event_names(&mut rx);
    assert_eq!(names, ["device_discovered", "device_quarantined"]);
}

#[tokio::test]
async fn unidentifiable_device_is_rejected_with_reason() {
    let h = harness(vec![]);
    let mut rx = h.bus.subscribe();
    let pipeline = h.service.pipeline();

    let (id, _) = pipeline.process_sighting(&mystery_ble()).await;

    let record = pipeline.store().get(&id).unwrap();
    assert_eq!(record.status, DeviceStatus::Rejected);
    assert_eq!(record.compatibility_score, 0);
    assert!(record
        .rejection_reason
        .as_deref()
        .unwrap()
        .contains("unknown device type"));

    let names = drain_event_names(&mut rx);
    assert_eq!(names, ["device_discovered", "device_rejected"]);
}

#[tokio::test]
async fn repeat_sighting_refreshes_instead_of_reprocessing() {
    let h = harness(vec![]);
    let pipeline = h.service.pipeline();

    let (id, first_new) = pipeline.process_sighting(&aria_sensor()).await;
    assert!(first_new);
    let integrated_at = pipeline.store().get(&id).unwrap().status;
    assert_eq!(integrated_at, DeviceStatus::Integrated);

    h.clock.advance(chrono::Duration::minutes(5));
    let resight = aria_sensor().with_rssi(-42);
    let (same_id, new) = pipeline.process_sighting(&resight).await;
    assert_eq!(same_id, id);
    assert!(!new);

    let record = pipeline.store().get(&id).unwrap();
    // Still integrated, liveness refreshed, no second integration attempt.
    assert_eq!(record.status, DeviceStatus::Integrated);
    assert_eq!(record.rssi, -42);
    assert_eq!(h.integrator.calls.lock().len(), 1);
}

#[tokio::test]
async fn auto_integration_toggle_queues_compatible_devices() {
    let config = DiscoveryConfig {
        auto_integration_enabled: false,
        ..Default::default()
    };
    let h = harness_with_config(vec![], config);
    let mut rx = h.bus.subscribe();
    let pipeline = h.service.pipeline();

    let (id, _) = pipeline.process_sighting(&aria_sensor()).await;

    let record = pipeline.store().get(&id).unwrap();
    assert_eq!(record.status, DeviceStatus::PendingApproval);
    assert!(record.pending_since.is_some());
    assert!(h.integrator.calls.lock().is_empty());

    let names = drain_event_names(&mut rx);
    assert_eq!(names, ["device_discovered", "device_pending_approval"]);
}

#[tokio::test]
async fn integration_failure_returns_device_to_discovered() {
    let h = harness(vec![]);
    h.integrator
        .succeed
        .store(false, std::sync::atomic::Ordering::SeqCst);
    let mut rx = h.bus.subscribe();
    let pipeline = h.service.pipeline();

    let (id, _) = pipeline.process_sighting(&aria_sensor()).await;

    let record = pipeline.store().get(&id).unwrap();
    assert_eq!(record.status, DeviceStatus::Discovered);
    assert!(record.connection_id.is_none());
    // The score survives, so the retry sweep can find the device.
    assert!(record.compatibility_score >= 70);

    let names = drain_event_names(&mut rx);
    assert_eq!(names, ["device_discovered", "integration_failed"]);

    // Radio recovers; the retry sweep finishes the job.
    h.integrator
        .succeed
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let retried = pipeline.retry_failed_integrations().await;
    assert_eq!(retried, 1);
    assert_eq!(
        pipeline.store().get(&id).unwrap().status,
        DeviceStatus::Integrated
    );
}

#[tokio::test]
async fn low_security_device_rejected_against_platform_minimum() {
    let h = harness(vec![]);
    let pipeline = h.service.pipeline();

    // Known manufacturer, but no trust history and no declared level:
    // the security band comes out below the default medium minimum.
    let plug = RawDescriptor::new(Protocol::Wifi, "192.168.1.77")
        .with_mac("B0:BE:76:00:00:01")
        .with_services(vec!["smart_plug_energy".to_string()])
        .with_rssi(-50);
    let (id, _) = pipeline.process_sighting(&plug).await;

    let record = pipeline.store().get(&id).unwrap();
    assert_eq!(record.device_type, DeviceType::SmartPlug);
    assert_eq!(record.status, DeviceStatus::Rejected);
    assert!(record
        .rejection_reason
        .as_deref()
        .unwrap()
        .contains("below platform minimum"));
}

#[tokio::test]
async fn every_device_lands_in_exactly_one_membership_set() {
    use wavegate_core::MinimumSecurityLevel;
    use wavegate_discovery::{IntegrationPolicy, PolicyBucket, PolicyEngine};

    // One admission per hour for sensors, so the second sensor queues.
    let mut policy = PolicyEngine::new();
    policy.set_policy(
        PolicyBucket::Sensor,
        IntegrationPolicy {
            enabled: true,
            max_devices_per_scan: 1,
            security_level_required: MinimumSecurityLevel::Low,
            require_manufacturer_whitelist: false,
            require_certification: false,
            allow_unknown_devices: true,
            quarantine_secs: 0,
        },
    );
    let h = harness_with_policy(vec![], policy);
    let pipeline = h.service.pipeline();

    pipeline.process_sighting(&aria_sensor()).await; // integrated
    let second_sensor = RawDescriptor::new(Protocol::Zigbee, "0x4432")
        .with_mac("54:EF:44:AA:10:02")
        .with_services(vec!["temperature_measurement".to_string()])
        .with_rssi(-58);
    pipeline.process_sighting(&second_sensor).await; // rate-limited → pending
    pipeline.process_sighting(&sentine_camera()).await; // quarantined
    pipeline.process_sighting(&mystery_ble()).await; // rejected

    let counts = pipeline.store().counts();
    assert_eq!(counts.total(), pipeline.store().len());
    assert_eq!(counts.integrated, 1);
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.discovered, 1); // the quarantined camera
    assert_eq!(counts.rejected, 1);
}
