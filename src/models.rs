//! Data models for the turbine telemetry pipeline.
//!
//! A reading moves through three shapes inside one processing step:
//! [`RawReading`] → [`EnrichedRecord`] → [`crate::FlatRecord`]. None of them
//! outlive the step except as bytes stored in the sinks.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::MetricError;
use crate::ranges::Parameter;

// ---

/// One telemetry reading as produced by a generator or received on the wire.
///
/// `device_id` and `timestamp` are optional because wire input may omit
/// them; the data-quality score accounts for that. Parameter values are kept
/// as raw JSON so a malformed value only affects the metric that reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    // ---
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,
}

impl RawReading {
    // ---
    pub fn new(
        device_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        values: impl IntoIterator<Item = (Parameter, f64)>,
    ) -> Self {
        // ---
        RawReading {
            device_id: Some(device_id.into()),
            timestamp: Some(timestamp),
            values: values
                .into_iter()
                .map(|(p, v)| (p.name().to_string(), Value::from(v)))
                .collect(),
        }
    }

    /// The non-null wire value of `p`, if any.
    pub fn value(&self, p: Parameter) -> Option<&Value> {
        self.values.get(p.name()).filter(|v| !v.is_null())
    }

    /// Coerce the value of `p` to a finite float.
    ///
    /// Numeric strings are accepted, matching what loosely-typed producers send.
    pub fn numeric(&self, p: Parameter) -> Result<f64, MetricError> {
        // ---
        let value = self.value(p).ok_or_else(|| MetricError::missing(p))?;
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed
            .filter(|v| v.is_finite())
            .ok_or_else(|| MetricError::NotNumeric {
                field: p.name(),
                value: value.to_string(),
            })
    }

    /// Device id used for lookups, paths and keys.
    pub fn device_key(&self) -> &str {
        self.device_id.as_deref().unwrap_or("unknown")
    }
}

/// Device ids name files and object paths, so only ASCII letters, digits,
/// `_` and `-` are accepted.
pub fn is_valid_device_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Parse an ISO-8601 date-time. RFC 3339 offsets are honoured; a naive
/// date-time is taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    // ---
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .into_iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// An unparseable timestamp reads as absent, so the reading is scored for it
/// instead of being rejected.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Value::as_str).and_then(parse_timestamp))
}

/// Reference metadata for one device. All fields absent means "unknown device".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceMetadata {
    // ---
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub install_date: Option<NaiveDate>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub nominal_capacity_kw: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
}

impl DeviceMetadata {
    pub fn is_empty(&self) -> bool {
        *self == DeviceMetadata::default()
    }
}

/// Description of the sensor that measures one parameter on a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorInfo {
    #[serde(default)]
    pub sensor_name: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sensor_type_id: Option<i64>,
}

/// Sensors of one device keyed by parameter name. May be empty.
pub type SensorMetadata = BTreeMap<String, SensorInfo>;

/// Latest site conditions recorded at a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(default)]
pub struct EnvironmentalData {
    pub wind_speed_ms: Option<f64>,
    pub wind_direction_degrees: Option<i32>,
    pub temperature_celsius: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub air_pressure_hpa: Option<f64>,
    pub visibility_km: Option<f64>,
    pub precipitation_mm: Option<f64>,
}

/// Latest maintenance record of a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(default)]
pub struct MaintenanceData {
    pub maintenance_status: Option<String>,
    pub last_maintenance_date: Option<NaiveDate>,
    pub next_maintenance_date: Option<NaiveDate>,
    pub efficiency_rating: Option<f64>,
    pub operating_hours: Option<f64>,
    pub maintenance_notes: Option<String>,
    pub technician_name: Option<String>,
}

/// Coarse operating state derived from output power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationalStatus {
    Generating,
    LowGeneration,
    Stopped,
}

impl OperationalStatus {
    /// Above 100 kW a turbine is generating; at or below zero it is stopped.
    pub fn from_output_power(kw: f64) -> Self {
        // ---
        if kw > 100.0 {
            OperationalStatus::Generating
        } else if kw > 0.0 {
            OperationalStatus::LowGeneration
        } else {
            OperationalStatus::Stopped
        }
    }

    pub fn as_str(self) -> &'static str {
        // ---
        match self {
            OperationalStatus::Generating => "generating",
            OperationalStatus::LowGeneration => "low_generation",
            OperationalStatus::Stopped => "stopped",
        }
    }
}

/// Metrics computed from a reading. A metric whose inputs were unusable is `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub efficiency_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operational_status: Option<OperationalStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_power_kw: Option<f64>,
}

/// Provenance of an enriched record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentInfo {
    pub processing_timestamp: DateTime<Utc>,
    pub data_quality_score: f64,
    pub enrichment_version: String,
    pub source: String,
    pub processed_by: String,
}

/// A reading joined with its metadata and derived metrics.
///
/// Serialized as-is to the backup sink, so the raw reading fields stay at the
/// top level exactly as they arrived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    // ---
    #[serde(flatten)]
    pub reading: RawReading,
    pub device_metadata: DeviceMetadata,
    pub sensor_metadata: SensorMetadata,
    pub derived_metrics: DerivedMetrics,
    pub enrichment_info: EnrichmentInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environmental_data: Option<EnvironmentalData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_data: Option<MaintenanceData>,
}

/// Outcome of one dual-sink write. Both sinks are always attempted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    pub primary_ok: bool,
    pub backup_ok: bool,
}

impl WriteResult {
    pub fn is_complete(&self) -> bool {
        self.primary_ok && self.backup_ok
    }

    /// Neither sink holds the record.
    pub fn is_lost(&self) -> bool {
        !self.primary_ok && !self.backup_ok
    }
}
