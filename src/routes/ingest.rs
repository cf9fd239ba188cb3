//! Telemetry ingestion endpoint.
//!
//! `POST /telemetry` takes one wire reading, runs it through the pipeline and
//! reports the per-sink outcome. A record that reached at least one sink is
//! accepted; a record lost on both sinks answers `502`; a metadata store that
//! cannot answer yields `503`.

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::{Pipeline, RawReading};

// ---

pub fn router() -> Router<Pipeline> {
    // ---
    Router::new().route("/telemetry", post(handler))
}

async fn handler(State(pipeline): State<Pipeline>, Json(raw): Json<RawReading>) -> impl IntoResponse {
    // ---
    let device_id = raw.device_key().to_string();
    info!(device_id = %device_id, "POST /telemetry");

    match pipeline.process(raw).await {
        Ok(record) if record.write_result().is_lost() => {
            error!(record_id = %record.record_id, "Record lost on both sinks");
            (StatusCode::BAD_GATEWAY, Json(json!(record))).into_response()
        }
        Ok(record) => (StatusCode::OK, Json(json!(record))).into_response(),
        Err(e) => {
            warn!(device_id = %device_id, "Enrichment failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
