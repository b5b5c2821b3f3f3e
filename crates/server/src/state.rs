// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use livewatch_stream::ExecutionRegistry;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::formatter::{JobCatalog, MemoryJobCatalog};
use crate::secrets::{MemorySecretStorage, SecretStorage};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Running job executions that clients can stream.
    pub executions: ExecutionRegistry,
    /// Display data for job and deploy pages.
    pub catalog: Arc<dyn JobCatalog>,
    /// Secret storage backend behind the admin routes.
    pub secrets: Arc<dyn SecretStorage>,
    /// Cancelled on shutdown; every stream session listens to a child token.
    pub shutdown: CancellationToken,
    pub config: ServerConfig,
}

impl AppState {
    /// State with in-memory collaborators and default configuration.
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[derive(Default)]
pub struct AppStateBuilder {
    executions: Option<ExecutionRegistry>,
    catalog: Option<Arc<dyn JobCatalog>>,
    secrets: Option<Arc<dyn SecretStorage>>,
    config: Option<ServerConfig>,
}

impl AppStateBuilder {
    pub fn executions(mut self, executions: ExecutionRegistry) -> Self {
        self.executions = Some(executions);
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn JobCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn secrets(mut self, secrets: Arc<dyn SecretStorage>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Arc<AppState> {
        Arc::new(AppState {
            start_time: Instant::now(),
            executions: self.executions.unwrap_or_default(),
            catalog: self
                .catalog
                .unwrap_or_else(|| Arc::new(MemoryJobCatalog::new())),
            secrets: self
                .secrets
                .unwrap_or_else(|| Arc::new(MemorySecretStorage::new())),
            shutdown: CancellationToken::new(),
            config: self.config.unwrap_or_default(),
        })
    }
}
