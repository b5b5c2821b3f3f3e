// crates/server/src/main.rs
//! livewatch server binary.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use livewatch_server::{app, metrics, AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,livewatch_server=info,livewatch_stream=info".into()),
        )
        .init();

    metrics::init_metrics();

    let config = ServerConfig::from_env();
    let addr = config.addr();
    let state = AppState::builder().config(config).build();
    let shutdown = state.shutdown.clone();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!("livewatch listening on http://{addr}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutting down, closing stream sessions");
            shutdown.cancel();
        })
        .await
        .context("server error")?;
    Ok(())
}
