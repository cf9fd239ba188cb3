//! One record's unit of work: enrich → flatten → dual-sink write.
//!
//! Shared by batch mode, continuous simulation and the HTTP ingestion route.
//! There is no atomicity across records or across the two sinks.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::enrich::EnrichmentEngine;
use crate::error::EnrichError;
use crate::flatten::flatten;
use crate::models::{RawReading, WriteResult};
use crate::sinks::DualSinkWriter;

// ---

/// What happened to one reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedRecord {
    pub record_id: String,
    pub primary_ok: bool,
    pub backup_ok: bool,
    pub data_quality_score: f64,
}

impl ProcessedRecord {
    pub fn write_result(&self) -> WriteResult {
        WriteResult {
            primary_ok: self.primary_ok,
            backup_ok: self.backup_ok,
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    engine: EnrichmentEngine,
    writer: DualSinkWriter,
}

impl Pipeline {
    // ---
    pub fn new(engine: EnrichmentEngine, writer: DualSinkWriter) -> Self {
        Pipeline { engine, writer }
    }

    /// Process one reading. Only enrichment can fail; sink outcomes are
    /// reported in the returned record.
    pub async fn process(&self, raw: RawReading) -> Result<ProcessedRecord, EnrichError> {
        self.process_at(raw, Utc::now()).await
    }

    /// Process one reading at `now`, which stamps the processing time, the
    /// partition keys and the record id alike.
    pub async fn process_at(
        &self,
        raw: RawReading,
        now: DateTime<Utc>,
    ) -> Result<ProcessedRecord, EnrichError> {
        // ---
        let enriched = self.engine.enrich_at(raw, now).await?;
        let flat = flatten(&enriched, now);
        let result = self.writer.write(&enriched, &flat).await;

        Ok(ProcessedRecord {
            record_id: flat.record_id,
            primary_ok: result.primary_ok,
            backup_ok: result.backup_ok,
            data_quality_score: enriched.enrichment_info.data_quality_score,
        })
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;

    use crate::metadata::CachedMetadataStore;
    use crate::ranges::Parameter;
    use crate::sinks::{MemoryBackupSink, MemoryPrimarySink};

    #[tokio::test]
    async fn test_one_clock_reading_per_record() {
        // ---
        let primary = MemoryPrimarySink::new();
        let backup = MemoryBackupSink::new();
        let pipeline = Pipeline::new(
            EnrichmentEngine::new(Arc::new(CachedMetadataStore::new())),
            DualSinkWriter::new(
                Arc::new(primary.clone()),
                Arc::new(backup.clone()),
                "turbine_telemetry",
                "backup",
            ),
        );

        // One microsecond before midnight: all stamps must agree on the day
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 23, 59, 59).unwrap()
            + chrono::Duration::microseconds(999_999);
        let raw = RawReading::new("TURBINE_001", now, [(Parameter::OutputPower, 10.0)]);
        let processed = pipeline.process_at(raw, now).await.unwrap();

        assert_eq!(processed.record_id, "TURBINE_001_20250601_235959_999999");
        let (_, row) = &primary.rows()[0];
        assert_eq!(row.processing_timestamp, now.to_rfc3339());
        assert_eq!((row.partition_year, row.partition_month, row.partition_day), (2025, 6, 1));
        assert!(backup.paths()[0].contains("/day=01/"));
    }
}
