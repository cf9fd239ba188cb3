//! Typed error values for each pipeline operation.
//!
//! Every stage reports failure as an explicit value; the caller decides
//! whether it is fatal. Only startup configuration errors abort a run.

use thiserror::Error;

use crate::ranges::Parameter;

// ---

/// Metadata store failure. An unknown device is *not* an error.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("metadata cache unreadable at {path}: {reason}")]
    Cache { path: String, reason: String },

    #[error("metadata store unavailable: {0}")]
    Unavailable(String),
}

/// Failure to compute a single derived metric. Never leaves the engine.
#[derive(Debug, Error, PartialEq)]
pub enum MetricError {
    #[error("{0} is missing")]
    Missing(&'static str),

    #[error("{field} is not numeric: {value}")]
    NotNumeric { field: &'static str, value: String },
}

impl MetricError {
    pub fn missing(p: Parameter) -> Self {
        MetricError::Missing(p.name())
    }
}

/// Enrichment could not produce a record.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("metadata lookup for {device_id} failed: {source}")]
    Metadata {
        device_id: String,
        #[source]
        source: MetadataError,
    },
}

/// A single sink write failed.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("primary append to {table} failed: {reason}")]
    Primary { table: String, reason: String },

    #[error("backup put to {path} failed: {reason}")]
    Backup { path: String, reason: String },

    #[error("invalid table path '{0}'")]
    InvalidTable(String),

    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// No readings could be obtained for a device.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no readings available for {0}")]
    Empty(String),

    #[error("reading source unavailable for {device_id}: {reason}")]
    Unavailable { device_id: String, reason: String },
}

/// Processing of one device stopped early. Isolated to that device.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Enrich(#[from] EnrichError),
}

/// A batch that must not start at all.
#[derive(Debug, Error, PartialEq)]
pub enum BatchError {
    #[error("no devices configured")]
    NoDevices,

    #[error("records per device must be at least 1")]
    NoRecords,
}
