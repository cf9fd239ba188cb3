//! File-backed metadata cache.
//!
//! The cache is a JSON snapshot of the metadata tables:
//!
//! ```json
//! {
//!   "devices": { "TURBINE_001": { "name": "North Ridge 1", "nominal_capacity_kw": 9500 } },
//!   "sensors": { "TURBINE_001": [ { "parameter_name": "voltage", "sensor_name": "VT-3" } ] },
//!   "environment": { "TURBINE_001": { "wind_speed_ms": 11.2, "temperature_celsius": 14.5 } },
//!   "maintenance": { "TURBINE_001": { "maintenance_status": "ok", "operating_hours": 41250 } },
//!   "sensor_types": [ { "parameter_name": "current", "sensor_name": "CT-1", "unit": "A" } ]
//! }
//! ```
//!
//! `export-cache` writes this file from the Postgres tables; every section is
//! optional on load.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MetadataStore;
use crate::error::MetadataError;
use crate::models::{
    DeviceMetadata, EnvironmentalData, MaintenanceData, SensorInfo, SensorMetadata,
};

// ---

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    devices: BTreeMap<String, DeviceMetadata>,
    #[serde(default)]
    sensors: BTreeMap<String, Vec<SensorEntry>>,
    #[serde(default)]
    environment: BTreeMap<String, EnvironmentalData>,
    #[serde(default)]
    maintenance: BTreeMap<String, MaintenanceData>,
    #[serde(default)]
    sensor_types: Vec<SensorEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SensorEntry {
    parameter_name: String,
    #[serde(flatten)]
    info: SensorInfo,
}

fn entries(sensors: &SensorMetadata) -> Vec<SensorEntry> {
    sensors
        .iter()
        .map(|(parameter_name, info)| SensorEntry {
            parameter_name: parameter_name.clone(),
            info: info.clone(),
        })
        .collect()
}

fn from_entries(entries: Vec<SensorEntry>) -> SensorMetadata {
    entries
        .into_iter()
        .map(|e| (e.parameter_name, e.info))
        .collect()
}

fn cache_err(path: &Path, reason: impl ToString) -> MetadataError {
    MetadataError::Cache {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// In-memory metadata lookups, optionally loaded from a cache file.
#[derive(Debug, Clone, Default)]
pub struct CachedMetadataStore {
    devices: HashMap<String, DeviceMetadata>,
    sensors: HashMap<String, SensorMetadata>,
    environment: HashMap<String, EnvironmentalData>,
    maintenance: HashMap<String, MaintenanceData>,
    sensor_types: SensorMetadata,
}

impl CachedMetadataStore {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a cache snapshot from `path`.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, MetadataError> {
        // ---
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| cache_err(path, e))?;
        let file: CacheFile = serde_json::from_slice(&bytes).map_err(|e| cache_err(path, e))?;

        let mut store = Self::new();
        for (device_id, mut meta) in file.devices {
            meta.device_id.get_or_insert_with(|| device_id.clone());
            store.devices.insert(device_id, meta);
        }
        for (device_id, sensors) in file.sensors {
            store.sensors.insert(device_id, from_entries(sensors));
        }
        store.environment.extend(file.environment);
        store.maintenance.extend(file.maintenance);
        store.sensor_types = from_entries(file.sensor_types);

        tracing::info!(
            "Loaded metadata cache {}: {} devices, {} sensor mappings, {} sensor types",
            path.display(),
            store.devices.len(),
            store.sensors.len(),
            store.sensor_types.len()
        );
        Ok(store)
    }

    /// Copy everything `source` knows about `device_ids` into a new cache.
    ///
    /// Unknown devices are left out rather than stored as empty entries.
    pub async fn snapshot(
        source: &dyn MetadataStore,
        device_ids: &[String],
    ) -> Result<Self, MetadataError> {
        // ---
        let mut store = Self::new();
        for device_id in device_ids {
            let meta = source.get_device(device_id).await?;
            if !meta.is_empty() {
                store.devices.insert(device_id.clone(), meta);
            }
            let sensors = source.get_sensors(device_id).await?;
            if !sensors.is_empty() {
                store.sensors.insert(device_id.clone(), sensors);
            }
            if let Some(env) = source.get_environment(device_id).await? {
                store.environment.insert(device_id.clone(), env);
            }
            if let Some(maintenance) = source.get_maintenance(device_id).await? {
                store.maintenance.insert(device_id.clone(), maintenance);
            }
        }
        store.sensor_types = source.get_sensor_types().await?;
        Ok(store)
    }

    /// Write the cache as JSON to `path`, creating parent directories.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), MetadataError> {
        // ---
        let path = path.as_ref();
        let file = CacheFile {
            generated_at: Some(Utc::now()),
            devices: self.devices.clone().into_iter().collect(),
            sensors: self
                .sensors
                .iter()
                .map(|(id, sensors)| (id.clone(), entries(sensors)))
                .collect(),
            environment: self.environment.clone().into_iter().collect(),
            maintenance: self.maintenance.clone().into_iter().collect(),
            sensor_types: entries(&self.sensor_types),
        };
        let bytes = serde_json::to_vec_pretty(&file).map_err(|e| cache_err(path, e))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| cache_err(path, e))?;
        }
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| cache_err(path, e))?;

        tracing::info!(
            "Wrote metadata cache {}: {} devices, {} sensor mappings",
            path.display(),
            self.devices.len(),
            self.sensors.len()
        );
        Ok(())
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn with_device(mut self, meta: DeviceMetadata) -> Self {
        // ---
        if let Some(id) = meta.device_id.clone() {
            self.devices.insert(id, meta);
        }
        self
    }

    pub fn with_sensor(
        mut self,
        device_id: impl Into<String>,
        parameter_name: impl Into<String>,
        info: SensorInfo,
    ) -> Self {
        // ---
        self.sensors
            .entry(device_id.into())
            .or_default()
            .insert(parameter_name.into(), info);
        self
    }

    pub fn with_environment(mut self, device_id: impl Into<String>, env: EnvironmentalData) -> Self {
        self.environment.insert(device_id.into(), env);
        self
    }

    pub fn with_maintenance(
        mut self,
        device_id: impl Into<String>,
        maintenance: MaintenanceData,
    ) -> Self {
        self.maintenance.insert(device_id.into(), maintenance);
        self
    }

    /// Add a fleet-wide catalog entry for `parameter_name`.
    pub fn with_sensor_type(mut self, parameter_name: impl Into<String>, info: SensorInfo) -> Self {
        self.sensor_types.insert(parameter_name.into(), info);
        self
    }
}

#[async_trait]
impl MetadataStore for CachedMetadataStore {
    async fn get_device(&self, device_id: &str) -> Result<DeviceMetadata, MetadataError> {
        Ok(self.devices.get(device_id).cloned().unwrap_or_default())
    }

    async fn get_sensors(&self, device_id: &str) -> Result<SensorMetadata, MetadataError> {
        Ok(self.sensors.get(device_id).cloned().unwrap_or_default())
    }

    async fn get_environment(
        &self,
        device_id: &str,
    ) -> Result<Option<EnvironmentalData>, MetadataError> {
        Ok(self.environment.get(device_id).cloned())
    }

    async fn get_maintenance(
        &self,
        device_id: &str,
    ) -> Result<Option<MaintenanceData>, MetadataError> {
        Ok(self.maintenance.get(device_id).cloned())
    }

    async fn get_sensor_types(&self) -> Result<SensorMetadata, MetadataError> {
        Ok(self.sensor_types.clone())
    }
}
