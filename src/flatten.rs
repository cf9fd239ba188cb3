//! Projection of an [`EnrichedRecord`] into a fixed-width flat row.
//!
//! The primary sink schema never accepts nulls, so every absent value is
//! default-filled: numbers become 0, strings become "", booleans false.
//! Partition keys come from the processing time `now`, not the event time.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::models::EnrichedRecord;
use crate::ranges::Parameter;

// ---

/// One row for the primary columnar sink. Every field is a scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRecord {
    // --- identity
    pub record_id: String,
    pub device_id: String,
    pub timestamp: String,
    pub processing_timestamp: String,

    // --- telemetry
    pub output_power: f64,
    pub rotor_rpm: f64,
    pub max_power_limit: f64,
    pub voltage: f64,
    pub current: f64,
    pub power_factor: f64,

    // --- partitioning
    pub partition_year: i32,
    pub partition_month: i32,
    pub partition_day: i32,
    pub partition_device: String,

    // --- device metadata
    pub device_name: String,
    pub location_lat: f64,
    pub location_lng: f64,
    pub manufacturer: String,
    pub model: String,
    pub nominal_power_kw: f64,
    pub installation_date: String,
    pub device_status: String,

    // --- derived metrics
    pub efficiency_percent: f64,
    pub operational_status: String,
    pub computed_power_kw: f64,

    // --- enrichment info
    pub data_quality_score: f64,
    pub enrichment_version: String,
    pub source: String,
    pub processed_by: String,
    pub sensor_count: i64,
    pub has_sensor_metadata: bool,

    // --- environment
    pub wind_speed_ms: f64,
    pub wind_direction_degrees: i32,
    pub temperature_celsius: f64,
    pub humidity_percent: f64,
    pub air_pressure_hpa: f64,
    pub visibility_km: f64,
    pub precipitation_mm: f64,
    pub has_environmental_data: bool,

    // --- maintenance
    pub maintenance_status: String,
    pub last_maintenance_date: String,
    pub next_maintenance_date: String,
    pub efficiency_rating: f64,
    pub operating_hours: f64,
    pub maintenance_notes: String,
    pub technician_name: String,
    pub has_maintenance_data: bool,

    pub record_version: String,
}

/// Layout version of [`FlatRecord`], stored with every row.
pub const RECORD_VERSION: &str = "2.0";

/// `<device_id>_<YYYYmmdd_HHMMSS_micros>`.
pub fn record_id(device_id: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}", device_id, now.format("%Y%m%d_%H%M%S_%6f"))
}

/// Flatten `record` for a write attempted at `now`.
pub fn flatten(record: &EnrichedRecord, now: DateTime<Utc>) -> FlatRecord {
    // ---
    let raw = &record.reading;
    let meta = &record.device_metadata;
    let metrics = &record.derived_metrics;
    let info = &record.enrichment_info;
    let env = record.environmental_data.clone().unwrap_or_default();
    let maintenance = record.maintenance_data.clone().unwrap_or_default();
    let date = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
    let device_id = raw.device_key().to_string();
    let value = |p: Parameter| raw.numeric(p).unwrap_or(0.0);

    FlatRecord {
        record_id: record_id(&device_id, now),
        device_id: device_id.clone(),
        timestamp: raw.timestamp.map(|t| t.to_rfc3339()).unwrap_or_default(),
        processing_timestamp: info.processing_timestamp.to_rfc3339(),

        output_power: value(Parameter::OutputPower),
        rotor_rpm: value(Parameter::RotorRpm),
        max_power_limit: value(Parameter::MaxPowerLimit),
        voltage: value(Parameter::Voltage),
        current: value(Parameter::Current),
        power_factor: value(Parameter::PowerFactor),

        partition_year: now.year(),
        partition_month: now.month() as i32,
        partition_day: now.day() as i32,
        partition_device: device_id,

        device_name: meta.name.clone().unwrap_or_default(),
        location_lat: meta.latitude.unwrap_or(0.0),
        location_lng: meta.longitude.unwrap_or(0.0),
        manufacturer: meta.manufacturer.clone().unwrap_or_default(),
        model: meta.model.clone().unwrap_or_default(),
        nominal_power_kw: meta.nominal_capacity_kw.unwrap_or(0.0),
        installation_date: date(meta.install_date),
        device_status: meta.status.clone().unwrap_or_default(),

        efficiency_percent: metrics.efficiency_percent.unwrap_or(0.0),
        operational_status: metrics
            .operational_status
            .map(|s| s.as_str().to_string())
            .unwrap_or_default(),
        computed_power_kw: metrics.computed_power_kw.unwrap_or(0.0),

        data_quality_score: info.data_quality_score,
        enrichment_version: info.enrichment_version.clone(),
        source: info.source.clone(),
        processed_by: info.processed_by.clone(),
        sensor_count: record.sensor_metadata.len() as i64,
        has_sensor_metadata: !record.sensor_metadata.is_empty(),

        wind_speed_ms: env.wind_speed_ms.unwrap_or(0.0),
        wind_direction_degrees: env.wind_direction_degrees.unwrap_or(0),
        temperature_celsius: env.temperature_celsius.unwrap_or(0.0),
        humidity_percent: env.humidity_percent.unwrap_or(0.0),
        air_pressure_hpa: env.air_pressure_hpa.unwrap_or(0.0),
        visibility_km: env.visibility_km.unwrap_or(0.0),
        precipitation_mm: env.precipitation_mm.unwrap_or(0.0),
        has_environmental_data: record.environmental_data.is_some(),

        maintenance_status: maintenance.maintenance_status.unwrap_or_default(),
        last_maintenance_date: date(maintenance.last_maintenance_date),
        next_maintenance_date: date(maintenance.next_maintenance_date),
        efficiency_rating: maintenance.efficiency_rating.unwrap_or(0.0),
        operating_hours: maintenance.operating_hours.unwrap_or(0.0),
        maintenance_notes: maintenance.maintenance_notes.unwrap_or_default(),
        technician_name: maintenance.technician_name.unwrap_or_default(),
        has_maintenance_data: record.maintenance_data.is_some(),

        record_version: RECORD_VERSION.to_string(),
    }
}
