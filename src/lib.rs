//! Wind turbine telemetry pipeline.
//!
//! Simulates per-device sensor readings as a bounded random walk, enriches
//! each reading with reference metadata and derived metrics, and persists the
//! result to a structured primary sink and a schema-free backup sink with
//! independently tracked outcomes.
//!
//! Modules talk to each other only through the names re-exported here, so
//! moving code between modules does not ripple through the crate.

pub mod batch;
pub mod config;
pub mod enrich;
pub mod error;
pub mod flatten;
pub mod generator;
pub mod metadata;
pub mod models;
pub mod pipeline;
pub mod ranges;
pub mod routes;
pub mod schema;
pub mod simulate;
pub mod sinks;
pub mod source;

pub use batch::{BatchOrchestrator, BatchReport, BatchSettings};
pub use config::Config;
pub use enrich::EnrichmentEngine;
pub use flatten::{flatten, FlatRecord};
pub use generator::{BoundedWalkGenerator, DeviceState};
pub use metadata::{CachedMetadataStore, MetadataStore, PgMetadataStore};
pub use models::{
    DerivedMetrics, DeviceMetadata, EnrichedRecord, EnvironmentalData, MaintenanceData,
    OperationalStatus, RawReading, SensorInfo, SensorMetadata, WriteResult,
};
pub use pipeline::{Pipeline, ProcessedRecord};
pub use ranges::{Parameter, ParameterRange};
pub use simulate::{run_simulation, SimulationSettings, SimulationStats};
pub use sinks::{
    BackupSink, DualSinkWriter, FsBackupSink, MemoryBackupSink, MemoryPrimarySink, PgPrimarySink,
    PrimarySink,
};
pub use source::{ReadingSource, ReplaySource, SimulatedSource};
