// crates/server/src/lib.rs
//! livewatch server library.
//!
//! Axum HTTP front end for live job streams: an SSE endpoint per job,
//! secret administration, health and Prometheus metrics.

pub mod config;
pub mod error;
pub mod formatter;
pub mod identity;
pub mod metrics;
pub mod routes;
pub mod secrets;
pub mod state;

pub use config::ServerConfig;
pub use error::*;
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the Axum application for the given state.
///
/// This sets up:
/// - API routes (health, streams, secrets) and `/metrics`
/// - CORS (allows any origin)
/// - Request tracing
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
