//! Postgres-backed metadata store.
//!
//! Reads the `turbines`, `sensor_types`, `turbine_sensors`,
//! `turbine_environment` and `turbine_maintenance` tables created by
//! [`crate::schema::create_schema`].

use async_trait::async_trait;
use sqlx::PgPool;

use super::MetadataStore;
use crate::error::MetadataError;
use crate::models::{
    DeviceMetadata, EnvironmentalData, MaintenanceData, SensorInfo, SensorMetadata,
};

// ---

#[derive(Debug, sqlx::FromRow)]
struct SensorRow {
    parameter_name: String,
    sensor_name: Option<String>,
    unit: Option<String>,
    description: Option<String>,
    sensor_type_id: i64,
}

#[derive(Debug, Clone)]
pub struct PgMetadataStore {
    pool: PgPool,
}

impl SensorRow {
    fn into_entry(self) -> (String, SensorInfo) {
        let info = SensorInfo {
            sensor_name: self.sensor_name,
            unit: self.unit,
            description: self.description,
            sensor_type_id: Some(self.sensor_type_id),
        };
        (self.parameter_name, info)
    }
}

impl PgMetadataStore {
    // ---
    pub fn new(pool: PgPool) -> Self {
        PgMetadataStore { pool }
    }

    /// Every device id in the `turbines` table.
    pub async fn list_devices(&self) -> Result<Vec<String>, MetadataError> {
        // ---
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT turbine_id FROM turbines ORDER BY turbine_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn get_device(&self, device_id: &str) -> Result<DeviceMetadata, MetadataError> {
        // ---
        let row = sqlx::query_as::<_, DeviceMetadata>(
            r#"
            SELECT
                turbine_id        AS device_id,
                location_name     AS name,
                latitude,
                longitude,
                installation_date AS install_date,
                manufacturer,
                model,
                nominal_power_kw  AS nominal_capacity_kw,
                status
            FROM turbines
            WHERE turbine_id = $1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        if row.is_none() {
            tracing::debug!(device_id, "No turbine metadata found");
        }
        Ok(row.unwrap_or_default())
    }

    async fn get_sensors(&self, device_id: &str) -> Result<SensorMetadata, MetadataError> {
        // ---
        let rows = sqlx::query_as::<_, SensorRow>(
            r#"
            SELECT
                st.parameter_name,
                st.sensor_name,
                st.unit_of_measurement AS unit,
                st.description,
                st.sensor_type_id
            FROM turbine_sensors ts
            INNER JOIN sensor_types st ON ts.sensor_type_id = st.sensor_type_id
            WHERE ts.turbine_id = $1
            ORDER BY st.parameter_name
            "#,
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(device_id, count = rows.len(), "Loaded sensor metadata");

        Ok(rows.into_iter().map(SensorRow::into_entry).collect())
    }

    async fn get_environment(
        &self,
        device_id: &str,
    ) -> Result<Option<EnvironmentalData>, MetadataError> {
        // ---
        let row = sqlx::query_as::<_, EnvironmentalData>(
            r#"
            SELECT
                wind_speed_ms, wind_direction_degrees, temperature_celsius,
                humidity_percent, air_pressure_hpa, visibility_km, precipitation_mm
            FROM turbine_environment
            WHERE turbine_id = $1
            ORDER BY recorded_at DESC
            LIMIT 1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_maintenance(
        &self,
        device_id: &str,
    ) -> Result<Option<MaintenanceData>, MetadataError> {
        // ---
        let row = sqlx::query_as::<_, MaintenanceData>(
            r#"
            SELECT
                maintenance_status, last_maintenance_date, next_maintenance_date,
                efficiency_rating, operating_hours, maintenance_notes, technician_name
            FROM turbine_maintenance
            WHERE turbine_id = $1
            ORDER BY recorded_at DESC
            LIMIT 1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_sensor_types(&self) -> Result<SensorMetadata, MetadataError> {
        // ---
        let rows = sqlx::query_as::<_, SensorRow>(
            r#"
            SELECT
                parameter_name,
                sensor_name,
                unit_of_measurement AS unit,
                description,
                sensor_type_id
            FROM sensor_types
            ORDER BY sensor_type_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        // Lowest type id wins when several types measure one parameter
        let mut catalog = SensorMetadata::new();
        for (parameter, info) in rows.into_iter().map(SensorRow::into_entry) {
            catalog.entry(parameter).or_insert(info);
        }
        Ok(catalog)
    }
}
