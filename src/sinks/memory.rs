//! In-memory sinks with call recording and failure injection.
//!
//! Used by tests and dry runs to observe exactly which writes were attempted.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{BackupSink, PrimarySink};
use crate::error::SinkError;
use crate::flatten::FlatRecord;

// ---

/// One attempted sink operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Append { table: String, record_id: String },
    Put { path: String, size: usize },
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking test thread must not hide the recorded state from others.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Primary sink that keeps appended rows in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryPrimarySink {
    rows: Arc<Mutex<Vec<(String, FlatRecord)>>>,
    calls: Arc<Mutex<Vec<SinkCall>>>,
    fail_devices: Arc<Mutex<Vec<String>>>,
    fail_all: Arc<Mutex<bool>>,
}

impl MemoryPrimarySink {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent append fail.
    pub fn inject_failure(&self) {
        *lock(&self.fail_all) = true;
    }

    /// Make appends for one device fail.
    pub fn inject_device_failure(&self, device_id: impl Into<String>) {
        lock(&self.fail_devices).push(device_id.into());
    }

    pub fn clear_failures(&self) {
        *lock(&self.fail_all) = false;
        lock(&self.fail_devices).clear();
    }

    /// Successfully appended `(table, row)` pairs in write order.
    pub fn rows(&self) -> Vec<(String, FlatRecord)> {
        lock(&self.rows).clone()
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        lock(&self.calls).clone()
    }

    pub fn append_calls(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl PrimarySink for MemoryPrimarySink {
    async fn append(&self, table_path: &str, record: &FlatRecord) -> Result<(), SinkError> {
        // ---
        lock(&self.calls).push(SinkCall::Append {
            table: table_path.to_string(),
            record_id: record.record_id.clone(),
        });

        let failing = *lock(&self.fail_all)
            || lock(&self.fail_devices).iter().any(|d| *d == record.device_id);
        if failing {
            return Err(SinkError::Primary {
                table: table_path.to_string(),
                reason: format!("injected failure for {}", record.record_id),
            });
        }

        lock(&self.rows).push((table_path.to_string(), record.clone()));
        Ok(())
    }
}

/// Backup sink that keeps objects in memory keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackupSink {
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    calls: Arc<Mutex<Vec<SinkCall>>>,
    fail_prefixes: Arc<Mutex<Vec<String>>>,
}

impl MemoryBackupSink {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every put whose path starts with `prefix`. An empty prefix fails all.
    pub fn inject_failure(&self, prefix: impl Into<String>) {
        lock(&self.fail_prefixes).push(prefix.into());
    }

    pub fn clear_failures(&self) {
        lock(&self.fail_prefixes).clear();
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        lock(&self.calls).clone()
    }

    pub fn put_calls(&self) -> usize {
        lock(&self.calls).len()
    }
}

#[async_trait]
impl BackupSink for MemoryBackupSink {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<(), SinkError> {
        // ---
        lock(&self.calls).push(SinkCall::Put {
            path: path.to_string(),
            size: bytes.len(),
        });

        if lock(&self.fail_prefixes).iter().any(|p| path.starts_with(p.as_str())) {
            return Err(SinkError::Backup {
                path: path.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        lock(&self.objects).insert(path.to_string(), bytes);
        Ok(())
    }
}
