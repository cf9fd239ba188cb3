//! Database schema management for `windfarm-telemetry`.
//!
//! Ensures the metadata tables and the primary telemetry table exist before
//! any processing starts. Applied once on startup from `main.rs`.

use anyhow::Result;
use sqlx::PgPool;

use crate::sinks::validate_table_path;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `turbines`, `sensor_types`, `turbine_sensors`,
/// `turbine_environment` and `turbine_maintenance` metadata tables and the
/// append-only telemetry table named `table_path`. Safe to call on every
/// startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool, table_path: &str) -> Result<()> {
    // ---
    validate_table_path(table_path)?;
    let mut tx = pool.begin().await?;

    // Device reference data
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS turbines (
            turbine_id        TEXT PRIMARY KEY,
            location_name     TEXT,
            latitude          DOUBLE PRECISION,
            longitude         DOUBLE PRECISION,
            installation_date DATE,
            manufacturer      TEXT,
            model             TEXT,
            nominal_power_kw  DOUBLE PRECISION,
            status            TEXT
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_types (
            sensor_type_id      BIGINT PRIMARY KEY,
            sensor_name         TEXT,
            parameter_name      TEXT NOT NULL,
            description         TEXT,
            unit_of_measurement TEXT
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS turbine_sensors (
            turbine_sensor_id BIGSERIAL PRIMARY KEY,
            turbine_id        TEXT   NOT NULL REFERENCES turbines (turbine_id),
            sensor_type_id    BIGINT NOT NULL REFERENCES sensor_types (sensor_type_id)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS turbine_environment (
            turbine_id             TEXT        NOT NULL REFERENCES turbines (turbine_id),
            recorded_at            TIMESTAMPTZ NOT NULL DEFAULT now(),
            wind_speed_ms          DOUBLE PRECISION,
            wind_direction_degrees INTEGER,
            temperature_celsius    DOUBLE PRECISION,
            humidity_percent       DOUBLE PRECISION,
            air_pressure_hpa       DOUBLE PRECISION,
            visibility_km          DOUBLE PRECISION,
            precipitation_mm       DOUBLE PRECISION,
            PRIMARY KEY (turbine_id, recorded_at)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS turbine_maintenance (
            turbine_id            TEXT        NOT NULL REFERENCES turbines (turbine_id),
            recorded_at           TIMESTAMPTZ NOT NULL DEFAULT now(),
            maintenance_status    TEXT,
            last_maintenance_date DATE,
            next_maintenance_date DATE,
            efficiency_rating     DOUBLE PRECISION,
            operating_hours       DOUBLE PRECISION,
            maintenance_notes     TEXT,
            technician_name       TEXT,
            PRIMARY KEY (turbine_id, recorded_at)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Primary sink: fixed-width, no nullable columns
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table_path} (
            record_id            TEXT             NOT NULL,
            device_id            TEXT             NOT NULL,
            timestamp            TEXT             NOT NULL,
            processing_timestamp TEXT             NOT NULL,
            output_power         DOUBLE PRECISION NOT NULL,
            rotor_rpm            DOUBLE PRECISION NOT NULL,
            max_power_limit      DOUBLE PRECISION NOT NULL,
            voltage              DOUBLE PRECISION NOT NULL,
            current              DOUBLE PRECISION NOT NULL,
            power_factor         DOUBLE PRECISION NOT NULL,
            partition_year       INTEGER          NOT NULL,
            partition_month      INTEGER          NOT NULL,
            partition_day        INTEGER          NOT NULL,
            partition_device     TEXT             NOT NULL,
            device_name          TEXT             NOT NULL,
            location_lat         DOUBLE PRECISION NOT NULL,
            location_lng         DOUBLE PRECISION NOT NULL,
            manufacturer         TEXT             NOT NULL,
            model                TEXT             NOT NULL,
            nominal_power_kw     DOUBLE PRECISION NOT NULL,
            installation_date    TEXT             NOT NULL,
            device_status        TEXT             NOT NULL,
            efficiency_percent   DOUBLE PRECISION NOT NULL,
            operational_status   TEXT             NOT NULL,
            computed_power_kw    DOUBLE PRECISION NOT NULL,
            data_quality_score   DOUBLE PRECISION NOT NULL,
            enrichment_version   TEXT             NOT NULL,
            source               TEXT             NOT NULL,
            processed_by         TEXT             NOT NULL,
            sensor_count         BIGINT           NOT NULL,
            has_sensor_metadata  BOOLEAN          NOT NULL,
            wind_speed_ms          DOUBLE PRECISION NOT NULL,
            wind_direction_degrees INTEGER          NOT NULL,
            temperature_celsius    DOUBLE PRECISION NOT NULL,
            humidity_percent       DOUBLE PRECISION NOT NULL,
            air_pressure_hpa       DOUBLE PRECISION NOT NULL,
            visibility_km          DOUBLE PRECISION NOT NULL,
            precipitation_mm       DOUBLE PRECISION NOT NULL,
            has_environmental_data BOOLEAN          NOT NULL,
            maintenance_status     TEXT             NOT NULL,
            last_maintenance_date  TEXT             NOT NULL,
            next_maintenance_date  TEXT             NOT NULL,
            efficiency_rating      DOUBLE PRECISION NOT NULL,
            operating_hours        DOUBLE PRECISION NOT NULL,
            maintenance_notes      TEXT             NOT NULL,
            technician_name        TEXT             NOT NULL,
            has_maintenance_data   BOOLEAN          NOT NULL,
            record_version         TEXT             NOT NULL
        );
        "#
    ))
    .execute(&mut *tx)
    .await?;

    // Partition-style index for date range scans per device
    let index_name = format!("idx_{}_partition", table_path.replace('.', "_"));
    sqlx::query(&format!(
        r#"
        CREATE INDEX IF NOT EXISTS {index_name}
            ON {table_path} (partition_year, partition_month, partition_day, partition_device);
        "#
    ))
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_turbine_sensors_turbine_id
            ON turbine_sensors (turbine_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
