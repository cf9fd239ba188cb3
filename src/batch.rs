//! Batch/backfill orchestration across a fleet of devices.
//!
//! Devices are independent: each gets its own ordered reading stream, and a
//! failure on one device is recorded and skipped. Within a device records
//! are processed strictly in order. Devices may fan out up to
//! `max_concurrent_devices` at a time.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{BatchError, DeviceError};
use crate::pipeline::Pipeline;
use crate::source::ReadingSource;

// ---

/// Failure reasons kept in the report are cut to this many characters.
pub const MAX_REASON_LEN: usize = 50;

/// Tunables of a batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSettings {
    pub records_per_device: usize,
    /// Pause between consecutive records of one device. Zero disables it.
    pub record_delay: Duration,
    /// Pause before each device after the first. Zero disables it.
    pub device_delay: Duration,
    pub max_concurrent_devices: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        BatchSettings {
            records_per_device: 1,
            record_delay: Duration::from_millis(300),
            device_delay: Duration::from_millis(500),
            max_concurrent_devices: 1,
        }
    }
}

/// Counters for one device.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceOutcome {
    pub device_id: String,
    pub processed: usize,
    pub primary_successful: usize,
    pub backup_successful: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceFailure {
    pub device_id: String,
    pub reason: String,
}

/// Summary of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub total_devices: usize,
    pub successful: Vec<DeviceOutcome>,
    pub failures: Vec<DeviceFailure>,
    pub total_processed: usize,
    pub primary_successful: usize,
    pub backup_successful: usize,
}

impl BatchReport {
    fn new(total_devices: usize) -> Self {
        BatchReport {
            run_id: Uuid::new_v4(),
            total_devices,
            successful: Vec::new(),
            failures: Vec::new(),
            total_processed: 0,
            primary_successful: 0,
            backup_successful: 0,
        }
    }

    fn record(&mut self, outcome: DeviceOutcome, result: Result<(), DeviceError>) {
        // ---
        self.total_processed += outcome.processed;
        self.primary_successful += outcome.primary_successful;
        self.backup_successful += outcome.backup_successful;

        match result {
            Ok(()) => self.successful.push(outcome),
            Err(e) => self.failures.push(DeviceFailure {
                device_id: outcome.device_id,
                reason: truncate_reason(&e.to_string()),
            }),
        }
    }

    /// Log the final summary.
    pub fn log_summary(&self) {
        // ---
        info!("Batch {} summary:", self.run_id);
        info!("  Devices            : {}", self.total_devices);
        info!("  Successful devices : {}", self.successful.len());
        info!("  Failed devices     : {}", self.failures.len());
        info!("  Records processed  : {}", self.total_processed);
        info!("  Primary successful : {}", self.primary_successful);
        info!("  Backup successful  : {}", self.backup_successful);

        for d in &self.successful {
            info!(
                "  ok   {} ({} records, {} primary, {} backup)",
                d.device_id, d.processed, d.primary_successful, d.backup_successful
            );
        }
        for f in &self.failures {
            warn!("  fail {} ({})", f.device_id, f.reason);
        }
    }
}

/// Cut `reason` to [`MAX_REASON_LEN`] characters.
pub fn truncate_reason(reason: &str) -> String {
    reason.chars().take(MAX_REASON_LEN).collect()
}

async fn pace(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Drives generation → enrichment → flatten → write for a set of devices.
pub struct BatchOrchestrator {
    pipeline: Pipeline,
    source: Arc<dyn ReadingSource>,
    settings: BatchSettings,
}

impl BatchOrchestrator {
    // ---
    pub fn new(pipeline: Pipeline, source: Arc<dyn ReadingSource>, settings: BatchSettings) -> Self {
        BatchOrchestrator {
            pipeline,
            source,
            settings,
        }
    }

    /// Process every device and return the aggregated report.
    ///
    /// Fails only before any processing starts, when there is nothing to do.
    pub async fn run(&self, devices: &[String]) -> Result<BatchReport, BatchError> {
        // ---
        if devices.is_empty() {
            return Err(BatchError::NoDevices);
        }
        if self.settings.records_per_device == 0 {
            return Err(BatchError::NoRecords);
        }

        let mut report = BatchReport::new(devices.len());
        info!(
            run_id = %report.run_id,
            "Starting batch: {} devices, {} records each",
            devices.len(),
            self.settings.records_per_device
        );

        let concurrency = self.settings.max_concurrent_devices.max(1);
        let results: Vec<_> = stream::iter(devices.iter().enumerate())
            .map(|(i, device_id)| async move {
                if i > 0 {
                    pace(self.settings.device_delay).await;
                }
                let span = info_span!("device", device_id = %device_id);
                self.run_device(device_id).instrument(span).await
            })
            .buffered(concurrency)
            .collect()
            .await;

        for (outcome, result) in results {
            report.record(outcome, result);
        }

        report.log_summary();
        Ok(report)
    }

    async fn run_device(&self, device_id: &str) -> (DeviceOutcome, Result<(), DeviceError>) {
        // ---
        let mut outcome = DeviceOutcome {
            device_id: device_id.to_string(),
            ..Default::default()
        };
        let result = self.process_device(device_id, &mut outcome).await;

        match &result {
            Ok(()) => info!(
                "{} done: {} records, {} primary, {} backup",
                device_id, outcome.processed, outcome.primary_successful, outcome.backup_successful
            ),
            Err(e) => error!("{} failed after {} records: {}", device_id, outcome.processed, e),
        }
        (outcome, result)
    }

    async fn process_device(
        &self,
        device_id: &str,
        outcome: &mut DeviceOutcome,
    ) -> Result<(), DeviceError> {
        // ---
        let readings = self
            .source
            .readings(device_id, self.settings.records_per_device)
            .await?;

        for (i, raw) in readings.into_iter().enumerate() {
            if i > 0 {
                pace(self.settings.record_delay).await;
            }
            let processed = self.pipeline.process(raw).await?;

            outcome.processed += 1;
            outcome.primary_successful += usize::from(processed.primary_ok);
            outcome.backup_successful += usize::from(processed.backup_ok);
        }
        Ok(())
    }
}
