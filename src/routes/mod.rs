//! Routes gateway: merges every endpoint subrouter and attaches the shared
//! [`Pipeline`] as state, so `main.rs` never sees individual endpoints.

use axum::Router;

use crate::Pipeline;

mod health;
mod ingest;

// ---

pub fn router(pipeline: Pipeline) -> Router {
    // ---
    Router::new()
        .merge(ingest::router())
        .merge(health::router())
        .with_state(pipeline)
}
