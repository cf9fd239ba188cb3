//! Enrichment engine: metadata join, derived metrics and data-quality score.
//!
//! Each derived metric is computed independently. A metric whose inputs are
//! missing or not numeric is left out of the record; the other metrics and
//! the record itself are unaffected.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{EnrichError, MetadataError, MetricError};
use crate::generator::SQRT_3;
use crate::metadata::MetadataStore;
use crate::models::{
    DerivedMetrics, DeviceMetadata, EnrichedRecord, EnrichmentInfo, OperationalStatus, RawReading,
    SensorMetadata,
};
use crate::ranges::{round_to, Parameter};

// ---

pub const ENRICHMENT_VERSION: &str = "2.0";

/// Penalty applied per missing required field.
const QUALITY_PENALTY: f64 = 0.2;

/// Joins readings with reference metadata and computes derived metrics.
#[derive(Clone)]
pub struct EnrichmentEngine {
    store: Arc<dyn MetadataStore>,
    source: String,
    processed_by: String,
}

impl EnrichmentEngine {
    // ---
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        EnrichmentEngine {
            store,
            source: "metadata-store".to_string(),
            processed_by: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Label recorded as the metadata source of every enriched record.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub async fn enrich(&self, raw: RawReading) -> Result<EnrichedRecord, EnrichError> {
        self.enrich_at(raw, Utc::now()).await
    }

    /// Enrich `raw`, stamping `processed_at` as the processing time.
    ///
    /// An unknown device enriches with empty metadata. Only a store that
    /// cannot answer makes enrichment fail.
    pub async fn enrich_at(
        &self,
        raw: RawReading,
        processed_at: DateTime<Utc>,
    ) -> Result<EnrichedRecord, EnrichError> {
        // ---
        let (device_metadata, sensor_metadata, environmental_data, maintenance_data) =
            match raw.device_id.as_deref() {
                Some(device_id) => {
                    let lookup_err = |source| EnrichError::Metadata {
                        device_id: device_id.to_string(),
                        source,
                    };
                    let store = &self.store;
                    let device = store.get_device(device_id).await.map_err(lookup_err)?;
                    let sensors = store.get_sensors(device_id).await.map_err(lookup_err)?;
                    let sensors = self.attach_sensors(&raw, sensors).await.map_err(lookup_err)?;
                    let env = store.get_environment(device_id).await.map_err(lookup_err)?;
                    let maintenance = store.get_maintenance(device_id).await.map_err(lookup_err)?;
                    (device, sensors, env, maintenance)
                }
                None => Default::default(),
            };

        let derived_metrics = derive_metrics(&raw, &device_metadata);
        let enrichment_info = EnrichmentInfo {
            processing_timestamp: processed_at,
            data_quality_score: data_quality_score(&raw),
            enrichment_version: ENRICHMENT_VERSION.to_string(),
            source: self.source.clone(),
            processed_by: self.processed_by.clone(),
        };

        Ok(EnrichedRecord {
            reading: raw,
            device_metadata,
            sensor_metadata,
            derived_metrics,
            enrichment_info,
            environmental_data,
            maintenance_data,
        })
    }

    /// Sensors for the parameters present in `raw`. A reported parameter the
    /// device has no mapping for takes the fleet catalog entry, if one exists.
    async fn attach_sensors(
        &self,
        raw: &RawReading,
        device_sensors: SensorMetadata,
    ) -> Result<SensorMetadata, MetadataError> {
        // ---
        let mut sensors = reported_sensors(raw, device_sensors);
        let unmapped: Vec<Parameter> = Parameter::ALL
            .into_iter()
            .filter(|p| raw.value(*p).is_some() && !sensors.contains_key(p.name()))
            .collect();
        if unmapped.is_empty() {
            return Ok(sensors);
        }

        let catalog = self.store.get_sensor_types().await?;
        for p in unmapped {
            if let Some(info) = catalog.get(p.name()) {
                debug!(parameter = p.name(), "Using catalog sensor metadata");
                sensors.insert(p.name().to_string(), info.clone());
            }
        }
        Ok(sensors)
    }
}

/// Keep only the sensors whose parameter is present in the reading.
fn reported_sensors(raw: &RawReading, mut sensors: SensorMetadata) -> SensorMetadata {
    // ---
    sensors.retain(|param, _| {
        Parameter::from_name(param).is_some_and(|p| raw.value(p).is_some())
    });
    sensors
}

/// Compute every derived metric, skipping the ones whose inputs are unusable.
pub fn derive_metrics(raw: &RawReading, device: &DeviceMetadata) -> DerivedMetrics {
    // ---
    DerivedMetrics {
        efficiency_percent: skip_on_error("efficiency_percent", efficiency_percent(raw, device)),
        operational_status: skip_on_error("operational_status", operational_status(raw)),
        computed_power_kw: skip_on_error("computed_power_kw", computed_power_kw(raw)),
    }
}

fn skip_on_error<T>(metric: &str, result: Result<T, MetricError>) -> Option<T> {
    // ---
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            debug!(metric, "Skipping derived metric: {}", e);
            None
        }
    }
}

/// Output power as a percentage of nameplate capacity; 0 without a usable capacity.
pub fn efficiency_percent(raw: &RawReading, device: &DeviceMetadata) -> Result<f64, MetricError> {
    // ---
    let power = raw.numeric(Parameter::OutputPower)?;
    Ok(match device.nominal_capacity_kw {
        Some(nominal) if nominal > 0.0 => round_to(power / nominal * 100.0, 2),
        _ => 0.0,
    })
}

pub fn operational_status(raw: &RawReading) -> Result<OperationalStatus, MetricError> {
    let power = raw.numeric(Parameter::OutputPower)?;
    Ok(OperationalStatus::from_output_power(power))
}

/// Three-phase active power `U·I·pf·√3 / 1000` in kW.
pub fn computed_power_kw(raw: &RawReading) -> Result<f64, MetricError> {
    // ---
    let voltage = raw.numeric(Parameter::Voltage)?;
    let current = raw.numeric(Parameter::Current)?;
    let power_factor = raw.numeric(Parameter::PowerFactor)?;
    Ok(round_to(voltage * current * power_factor * SQRT_3 / 1000.0, 2))
}

/// Completeness score in `[0, 1]`: 0.2 off for each missing required field
/// (`device_id`, `timestamp`, `output_power`).
pub fn data_quality_score(raw: &RawReading) -> f64 {
    // ---
    let missing = [
        raw.device_id.is_none(),
        raw.timestamp.is_none(),
        raw.value(Parameter::OutputPower).is_none(),
    ]
    .into_iter()
    .filter(|m| *m)
    .count();

    round_to((1.0 - QUALITY_PENALTY * missing as f64).clamp(0.0, 1.0), 2)
}
