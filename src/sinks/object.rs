//! Filesystem-backed object sink for backup copies.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::BackupSink;
use crate::error::SinkError;

// ---

/// Stores each object as a file under `root`, creating directories on demand.
#[derive(Debug, Clone)]
pub struct FsBackupSink {
    root: PathBuf,
}

impl FsBackupSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsBackupSink { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, SinkError> {
        // ---
        let relative = Path::new(path);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !contained {
            return Err(SinkError::Backup {
                path: path.to_string(),
                reason: "object path must be relative and stay under the sink root".into(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BackupSink for FsBackupSink {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<(), SinkError> {
        // ---
        let target = self.resolve(path)?;
        let backup_err = |e: std::io::Error| SinkError::Backup {
            path: path.to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(backup_err)?;
        }
        tokio::fs::write(&target, bytes).await.map_err(backup_err)?;

        tracing::debug!("Backup object written: {}", target.display());
        Ok(())
    }
}
