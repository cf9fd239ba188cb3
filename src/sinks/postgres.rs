//! Postgres primary sink: one INSERT per flat row, append-only.

use async_trait::async_trait;
use sqlx::PgPool;

use super::PrimarySink;
use crate::error::SinkError;
use crate::flatten::FlatRecord;

// ---

/// Accept `table` or `schema.table` made of ASCII identifiers.
///
/// Table paths are interpolated into SQL, so anything else is rejected.
pub fn validate_table_path(table_path: &str) -> Result<(), SinkError> {
    // ---
    let valid_ident = |s: &str| {
        let mut chars = s.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    let parts: Vec<&str> = table_path.split('.').collect();
    if parts.len() <= 2 && parts.iter().all(|p| valid_ident(p)) {
        Ok(())
    } else {
        Err(SinkError::InvalidTable(table_path.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct PgPrimarySink {
    pool: PgPool,
}

impl PgPrimarySink {
    pub fn new(pool: PgPool) -> Self {
        PgPrimarySink { pool }
    }
}

#[async_trait]
impl PrimarySink for PgPrimarySink {
    async fn append(&self, table_path: &str, r: &FlatRecord) -> Result<(), SinkError> {
        // ---
        validate_table_path(table_path)?;

        let sql = format!(
            r#"
            INSERT INTO {table_path} (
                record_id, device_id, timestamp, processing_timestamp,
                output_power, rotor_rpm, max_power_limit, voltage, current, power_factor,
                partition_year, partition_month, partition_day, partition_device,
                device_name, location_lat, location_lng, manufacturer, model,
                nominal_power_kw, installation_date, device_status,
                efficiency_percent, operational_status, computed_power_kw,
                data_quality_score, enrichment_version, source, processed_by,
                sensor_count, has_sensor_metadata,
                wind_speed_ms, wind_direction_degrees, temperature_celsius,
                humidity_percent, air_pressure_hpa, visibility_km, precipitation_mm,
                has_environmental_data,
                maintenance_status, last_maintenance_date, next_maintenance_date,
                efficiency_rating, operating_hours, maintenance_notes, technician_name,
                has_maintenance_data, record_version
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
                $21, $22, $23, $24, $25, $26, $27, $28, $29, $30,
                $31, $32, $33, $34, $35, $36, $37, $38, $39, $40,
                $41, $42, $43, $44, $45, $46, $47, $48
            )
            "#
        );

        sqlx::query(&sql)
            .bind(&r.record_id)
            .bind(&r.device_id)
            .bind(&r.timestamp)
            .bind(&r.processing_timestamp)
            .bind(r.output_power)
            .bind(r.rotor_rpm)
            .bind(r.max_power_limit)
            .bind(r.voltage)
            .bind(r.current)
            .bind(r.power_factor)
            .bind(r.partition_year)
            .bind(r.partition_month)
            .bind(r.partition_day)
            .bind(&r.partition_device)
            .bind(&r.device_name)
            .bind(r.location_lat)
            .bind(r.location_lng)
            .bind(&r.manufacturer)
            .bind(&r.model)
            .bind(r.nominal_power_kw)
            .bind(&r.installation_date)
            .bind(&r.device_status)
            .bind(r.efficiency_percent)
            .bind(&r.operational_status)
            .bind(r.computed_power_kw)
            .bind(r.data_quality_score)
            .bind(&r.enrichment_version)
            .bind(&r.source)
            .bind(&r.processed_by)
            .bind(r.sensor_count)
            .bind(r.has_sensor_metadata)
            .bind(r.wind_speed_ms)
            .bind(r.wind_direction_degrees)
            .bind(r.temperature_celsius)
            .bind(r.humidity_percent)
            .bind(r.air_pressure_hpa)
            .bind(r.visibility_km)
            .bind(r.precipitation_mm)
            .bind(r.has_environmental_data)
            .bind(&r.maintenance_status)
            .bind(&r.last_maintenance_date)
            .bind(&r.next_maintenance_date)
            .bind(r.efficiency_rating)
            .bind(r.operating_hours)
            .bind(&r.maintenance_notes)
            .bind(&r.technician_name)
            .bind(r.has_maintenance_data)
            .bind(&r.record_version)
            .execute(&self.pool)
            .await
            .map_err(|e| SinkError::Primary {
                table: table_path.to_string(),
                reason: e.to_string(),
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_table_path_validation() {
        // ---
        assert!(validate_table_path("turbine_telemetry").is_ok());
        assert!(validate_table_path("analytics.turbine_telemetry").is_ok());
        assert!(validate_table_path("").is_err());
        assert!(validate_table_path("a.b.c").is_err());
        assert!(validate_table_path("9lives").is_err());
        assert!(validate_table_path("t; DROP TABLE turbines").is_err());
    }
}
