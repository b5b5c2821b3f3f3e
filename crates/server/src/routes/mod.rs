// crates/server/src/routes/mod.rs
//! API route handlers for the livewatch server.

pub mod health;
pub mod metrics;
pub mod secrets;
pub mod streams;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET /api/health - Health check
/// - GET /api/streams - Running jobs with viewer counts
/// - GET /api/streams/{job_id} - SSE stream of a job's page updates
/// - GET /api/streams/{job_id}/viewers - Current viewers of a job
/// - GET /api/admin/secrets - List secret keys (`query` filter)
/// - POST /api/admin/secrets - Create a secret from key parts
/// - GET/PUT/DELETE /api/admin/secrets/{*key} - Read, write, remove a secret
/// - GET /metrics - Prometheus metrics (no /api prefix)
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", streams::router())
        .nest("/api", secrets::router())
        .merge(metrics::router())
        .with_state(state)
}
