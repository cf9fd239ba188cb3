use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use windfarm_telemetry::{
    routes, CachedMetadataStore, DeviceMetadata, DualSinkWriter, EnrichedRecord,
    EnrichmentEngine, MemoryBackupSink, MemoryPrimarySink, Pipeline,
};

#[derive(Debug, Deserialize)]
struct Processed {
    record_id: String,
    primary_ok: bool,
    backup_ok: bool,
    data_quality_score: f64,
}

struct TestServer {
    base: String,
    primary: MemoryPrimarySink,
    backup: MemoryBackupSink,
}

async fn spawn_server() -> Result<TestServer> {
    // ---
    let store = CachedMetadataStore::new().with_device(DeviceMetadata {
        device_id: Some("TURBINE_001".into()),
        name: Some("North Ridge 1".into()),
        manufacturer: Some("Vestas".into()),
        nominal_capacity_kw: Some(9500.0),
        ..Default::default()
    });
    let primary = MemoryPrimarySink::new();
    let backup = MemoryBackupSink::new();

    let pipeline = Pipeline::new(
        EnrichmentEngine::new(Arc::new(store)),
        DualSinkWriter::new(
            Arc::new(primary.clone()),
            Arc::new(backup.clone()),
            "turbine_telemetry",
            "enriched-telemetry-backup",
        ),
    );

    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, routes::router(pipeline)).await.ok();
    });

    Ok(TestServer {
        base: format!("http://{addr}"),
        primary,
        backup,
    })
}

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    // ---
    let server = spawn_server().await?;
    let body: serde_json::Value = Client::new()
        .get(format!("{}/health", server.base))
        .send()
        .await?
        .json()
        .await?;

    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn telemetry_is_enriched_and_written_to_both_sinks() -> Result<()> {
    // ---
    let server = spawn_server().await?;
    let response = Client::new()
        .post(format!("{}/telemetry", server.base))
        .json(&json!({
            "device_id": "TURBINE_001",
            "timestamp": "2025-06-01T09:59:58Z",
            "output_power": 1500.0,
            "rotor_rpm": 14.2,
            "max_power_limit": 12000.0,
            "voltage": 630.0,
            "current": 2000.0,
            "power_factor": 0.9
        }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let processed: Processed = response.json().await?;
    assert!(processed.primary_ok && processed.backup_ok);
    assert_eq!(processed.data_quality_score, 1.0);
    assert!(processed.record_id.starts_with("TURBINE_001_"));

    // 1) Flat row: metadata joined, metrics computed, no gaps
    let rows = server.primary.rows();
    assert_eq!(rows.len(), 1);
    let (table, row) = &rows[0];
    assert_eq!(table, "turbine_telemetry");
    assert_eq!(row.record_id, processed.record_id);
    assert_eq!(row.device_name, "North Ridge 1");
    assert_eq!(row.efficiency_percent, 15.79);
    assert_eq!(row.operational_status, "generating");
    assert_eq!(row.computed_power_kw, 1964.15);

    // 2) Backup object: full nested record at the partitioned path
    let paths = server.backup.paths();
    assert_eq!(paths.len(), 1);
    assert!(paths[0].starts_with("enriched-telemetry-backup/year="));
    assert!(paths[0].contains("/device=TURBINE_001/"));
    assert!(paths[0].ends_with(&format!("{}.json", processed.record_id)));

    let stored: EnrichedRecord = serde_json::from_slice(&server.backup.get(&paths[0]).unwrap())?;
    assert_eq!(stored.device_metadata.manufacturer.as_deref(), Some("Vestas"));
    assert_eq!(stored.derived_metrics.efficiency_percent, Some(15.79));

    Ok(())
}

#[tokio::test]
async fn incomplete_reading_is_scored_not_rejected() -> Result<()> {
    // ---
    let server = spawn_server().await?;
    let processed: Processed = Client::new()
        .post(format!("{}/telemetry", server.base))
        .json(&json!({ "device_id": "TURBINE_404", "voltage": "not a number" }))
        .send()
        .await?
        .json()
        .await?;

    // timestamp and output_power missing
    assert_eq!(processed.data_quality_score, 0.6);
    let (_, row) = &server.primary.rows()[0];
    assert_eq!(row.device_name, "");
    assert_eq!(row.voltage, 0.0);
    assert_eq!(row.operational_status, "");
    Ok(())
}

#[tokio::test]
async fn primary_outage_still_accepts_via_backup() -> Result<()> {
    // ---
    let server = spawn_server().await?;
    server.primary.inject_failure();

    let response = Client::new()
        .post(format!("{}/telemetry", server.base))
        .json(&json!({ "device_id": "TURBINE_001", "output_power": 10.0 }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let processed: Processed = response.json().await?;
    assert!(!processed.primary_ok);
    assert!(processed.backup_ok);

    server.backup.inject_failure("");
    let response = Client::new()
        .post(format!("{}/telemetry", server.base))
        .json(&json!({ "device_id": "TURBINE_001", "output_power": 10.0 }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    // Both sinks recover without a restart
    server.primary.clear_failures();
    server.backup.clear_failures();
    let response = Client::new()
        .post(format!("{}/telemetry", server.base))
        .json(&json!({ "device_id": "TURBINE_001", "output_power": 10.0 }))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let processed: Processed = response.json().await?;
    assert!(processed.primary_ok);
    assert!(processed.backup_ok);
    Ok(())
}
