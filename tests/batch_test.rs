use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use windfarm_telemetry::error::{BatchError, MetadataError};
use windfarm_telemetry::{
    run_simulation, BatchOrchestrator, BatchSettings, CachedMetadataStore, DeviceMetadata,
    DualSinkWriter, EnrichmentEngine, MemoryBackupSink, MemoryPrimarySink, MetadataStore,
    Pipeline, SensorMetadata, SimulatedSource, SimulationSettings,
};

/// Metadata store whose lookups fail for one device.
struct FlakyStore {
    inner: CachedMetadataStore,
    broken: &'static str,
}

#[async_trait]
impl MetadataStore for FlakyStore {
    async fn get_device(&self, device_id: &str) -> Result<DeviceMetadata, MetadataError> {
        if device_id == self.broken {
            return Err(MetadataError::Unavailable("connection reset by peer".into()));
        }
        self.inner.get_device(device_id).await
    }

    async fn get_sensors(&self, device_id: &str) -> Result<SensorMetadata, MetadataError> {
        self.inner.get_sensors(device_id).await
    }
}

struct Harness {
    primary: MemoryPrimarySink,
    backup: MemoryBackupSink,
    pipeline: Pipeline,
}

fn harness(store: Arc<dyn MetadataStore>) -> Harness {
    // ---
    let primary = MemoryPrimarySink::new();
    let backup = MemoryBackupSink::new();
    let pipeline = Pipeline::new(
        EnrichmentEngine::new(store),
        DualSinkWriter::new(
            Arc::new(primary.clone()),
            Arc::new(backup.clone()),
            "turbine_telemetry",
            "enriched-telemetry-backup",
        ),
    );
    Harness {
        primary,
        backup,
        pipeline,
    }
}

fn fleet(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("TURBINE_{i:03}")).collect()
}

fn fast_settings(records_per_device: usize) -> BatchSettings {
    BatchSettings {
        records_per_device,
        record_delay: Duration::ZERO,
        device_delay: Duration::ZERO,
        max_concurrent_devices: 1,
    }
}

fn metadata() -> CachedMetadataStore {
    // ---
    fleet(3).into_iter().fold(CachedMetadataStore::new(), |store, id| {
        store.with_device(DeviceMetadata {
            device_id: Some(id),
            nominal_capacity_kw: Some(9500.0),
            ..Default::default()
        })
    })
}

#[tokio::test]
async fn failing_device_is_isolated() {
    // ---
    let store = FlakyStore {
        inner: metadata(),
        broken: "TURBINE_002",
    };
    let h = harness(Arc::new(store));
    let orchestrator = BatchOrchestrator::new(
        h.pipeline.clone(),
        Arc::new(SimulatedSource::new(Some(1))),
        fast_settings(2),
    );

    let report = assert_ok!(orchestrator.run(&fleet(3)).await);

    assert_eq!(report.total_devices, 3);
    assert_eq!(report.successful.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].device_id, "TURBINE_002");
    assert!(report.failures[0].reason.len() <= 50);
    assert_eq!(report.total_processed, 4);
    assert_eq!(report.primary_successful, 4);
    assert_eq!(report.backup_successful, 4);

    let devices: Vec<String> = h.primary.rows().into_iter().map(|(_, r)| r.device_id).collect();
    assert_eq!(
        devices,
        vec!["TURBINE_001", "TURBINE_001", "TURBINE_003", "TURBINE_003"]
    );
}

#[tokio::test]
async fn sink_failures_are_counted_per_sink() {
    // ---
    let h = harness(Arc::new(metadata()));
    h.primary.inject_device_failure("TURBINE_001");

    let orchestrator = BatchOrchestrator::new(
        h.pipeline.clone(),
        Arc::new(SimulatedSource::new(Some(2))),
        fast_settings(3),
    );
    let report = orchestrator.run(&fleet(2)).await.unwrap();

    // Sink failures never fail the device
    assert!(report.failures.is_empty());
    assert_eq!(report.total_processed, 6);
    assert_eq!(report.primary_successful, 3);
    assert_eq!(report.backup_successful, 6);
    assert_eq!(h.backup.put_calls(), 6);
    assert_eq!(h.primary.append_calls(), 6);
}

#[tokio::test]
async fn concurrent_fan_out_keeps_per_device_order() {
    // ---
    let h = harness(Arc::new(metadata()));
    let settings = BatchSettings {
        max_concurrent_devices: 3,
        ..fast_settings(5)
    };
    let orchestrator =
        BatchOrchestrator::new(h.pipeline.clone(), Arc::new(SimulatedSource::new(Some(3))), settings);

    let report = orchestrator.run(&fleet(3)).await.unwrap();
    assert_eq!(report.total_processed, 15);
    // Report lists devices in input order
    let ids: Vec<&str> = report.successful.iter().map(|d| d.device_id.as_str()).collect();
    assert_eq!(ids, vec!["TURBINE_001", "TURBINE_002", "TURBINE_003"]);

    for device in fleet(3) {
        let stamps: Vec<DateTime<FixedOffset>> = h
            .primary
            .rows()
            .into_iter()
            .filter(|(_, r)| r.device_id == device)
            .map(|(_, r)| DateTime::parse_from_rfc3339(&r.timestamp).unwrap())
            .collect();
        assert_eq!(stamps.len(), 5);
        let mut sorted = stamps.clone();
        sorted.sort();
        assert_eq!(stamps, sorted, "{device} records reordered");
    }
}

#[tokio::test]
async fn empty_fleet_aborts_before_processing() {
    // ---
    let h = harness(Arc::new(metadata()));
    let orchestrator = BatchOrchestrator::new(
        h.pipeline.clone(),
        Arc::new(SimulatedSource::default()),
        fast_settings(1),
    );

    let err = assert_err!(orchestrator.run(&[]).await);
    assert_eq!(err, BatchError::NoDevices);
    assert_eq!(h.primary.append_calls(), 0);
    assert_eq!(h.backup.put_calls(), 0);
}

#[tokio::test]
async fn simulation_runs_each_device_to_its_cap() {
    // ---
    let h = harness(Arc::new(metadata()));
    let settings = SimulationSettings {
        min_interval: Duration::ZERO,
        max_interval: Duration::from_millis(2),
        seed: Some(5),
        max_readings_per_device: Some(4),
        channel_capacity: 8,
    };

    let stats = run_simulation(h.pipeline.clone(), &fleet(3), settings, CancellationToken::new()).await;

    assert_eq!(stats.processed, 12);
    assert_eq!(stats.primary_successful, 12);
    assert_eq!(stats.backup_successful, 12);
    assert_eq!(h.backup.paths().len(), h.backup.put_calls());
}

#[tokio::test]
async fn simulation_stops_between_iterations_on_cancel() {
    // ---
    let h = harness(Arc::new(metadata()));
    let settings = SimulationSettings {
        min_interval: Duration::from_secs(30),
        max_interval: Duration::from_secs(30),
        seed: Some(6),
        max_readings_per_device: None,
        channel_capacity: 8,
    };

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let stats = run_simulation(h.pipeline.clone(), &fleet(2), settings, cancel).await;

    // One reading per device before the long sleep, then a clean stop
    assert_eq!(stats.processed, 2);
    assert_eq!(h.primary.append_calls(), 2);
}
