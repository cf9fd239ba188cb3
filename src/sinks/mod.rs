//! Sink gateway: the two storage seams and the dual-sink writer.
//!
//! The primary sink is a fixed-schema, append-only table of [`FlatRecord`]
//! rows partitioned by processing date. The backup sink is a schema-free
//! object store holding the full nested [`EnrichedRecord`] as JSON. The two
//! writes are independent: neither outcome gates the other.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::SinkError;
use crate::flatten::FlatRecord;
use crate::models::{EnrichedRecord, WriteResult};

mod memory;
mod object;
mod postgres;

pub use memory::{MemoryBackupSink, MemoryPrimarySink, SinkCall};
pub use object::FsBackupSink;
pub use postgres::{validate_table_path, PgPrimarySink};

// ---

/// Structured, append-only store for flat rows.
#[async_trait]
pub trait PrimarySink: Send + Sync {
    async fn append(&self, table_path: &str, record: &FlatRecord) -> Result<(), SinkError>;
}

/// Durable object store addressed by path.
#[async_trait]
pub trait BackupSink: Send + Sync {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<(), SinkError>;
}

/// Object path of a record's backup copy:
/// `<prefix>/year=<Y>/month=<MM>/day=<DD>/device=<ID>/<record_id>.json`.
pub fn backup_path(prefix: &str, flat: &FlatRecord) -> String {
    // ---
    format!(
        "{}/year={:04}/month={:02}/day={:02}/device={}/{}.json",
        prefix.trim_end_matches('/'),
        flat.partition_year,
        flat.partition_month,
        flat.partition_day,
        flat.partition_device,
        flat.record_id
    )
}

/// Writes each record to both sinks and reports the two outcomes separately.
#[derive(Clone)]
pub struct DualSinkWriter {
    primary: Arc<dyn PrimarySink>,
    backup: Arc<dyn BackupSink>,
    table_path: String,
    backup_prefix: String,
}

impl DualSinkWriter {
    // ---
    pub fn new(
        primary: Arc<dyn PrimarySink>,
        backup: Arc<dyn BackupSink>,
        table_path: impl Into<String>,
        backup_prefix: impl Into<String>,
    ) -> Self {
        DualSinkWriter {
            primary,
            backup,
            table_path: table_path.into(),
            backup_prefix: backup_prefix.into(),
        }
    }

    /// Append `flat` to the primary sink, then put `enriched` to the backup
    /// sink. Both are always attempted; failures are logged, never raised.
    pub async fn write(&self, enriched: &EnrichedRecord, flat: &FlatRecord) -> WriteResult {
        // ---
        let record_id = flat.record_id.as_str();

        let primary_ok = match self.primary.append(&self.table_path, flat).await {
            Ok(()) => true,
            Err(e) => {
                warn!(record_id, "Primary sink write failed: {}", e);
                false
            }
        };

        let path = backup_path(&self.backup_prefix, flat);
        let backup_ok = match self.put_backup(&path, enriched).await {
            Ok(()) => true,
            Err(e) => {
                warn!(record_id, "Backup sink write failed: {}", e);
                false
            }
        };

        let result = WriteResult { primary_ok, backup_ok };
        if result.is_lost() {
            warn!(record_id, "Record lost: both sinks failed");
        } else {
            debug!(record_id, primary_ok, backup_ok, "Record written");
        }
        result
    }

    async fn put_backup(&self, path: &str, enriched: &EnrichedRecord) -> Result<(), SinkError> {
        // ---
        let bytes = serde_json::to_vec_pretty(enriched)?;
        self.backup.put(path, bytes).await
    }
}
