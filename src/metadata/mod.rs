//! Metadata store gateway.
//!
//! Exposes the [`MetadataStore`] seam and its two implementations: a
//! Postgres-backed store and a JSON file cache loaded once at startup.
//! Callers only see the trait; the backend is picked in `main.rs`.

use async_trait::async_trait;

use crate::error::MetadataError;
use crate::models::{DeviceMetadata, EnvironmentalData, MaintenanceData, SensorMetadata};

mod cache;
mod postgres;

pub use cache::CachedMetadataStore;
pub use postgres::PgMetadataStore;

// ---

/// Reference data lookups by device id.
///
/// An unknown device yields empty metadata, never an error. Errors are
/// reserved for a store that cannot answer at all.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get_device(&self, device_id: &str) -> Result<DeviceMetadata, MetadataError>;

    async fn get_sensors(&self, device_id: &str) -> Result<SensorMetadata, MetadataError>;

    /// Latest site conditions of the device, if any were recorded.
    async fn get_environment(
        &self,
        _device_id: &str,
    ) -> Result<Option<EnvironmentalData>, MetadataError> {
        Ok(None)
    }

    /// Latest maintenance record of the device, if any.
    async fn get_maintenance(
        &self,
        _device_id: &str,
    ) -> Result<Option<MaintenanceData>, MetadataError> {
        Ok(None)
    }

    /// Fleet-wide sensor catalog keyed by parameter name. Used for parameters
    /// a device reports without a device-specific sensor mapping.
    async fn get_sensor_types(&self) -> Result<SensorMetadata, MetadataError> {
        Ok(SensorMetadata::new())
    }
}
