// crates/stream/src/lib.rs
//! Live event streaming for running job executions.
//!
//! Provides:
//! - `OutputChannel` — append-only, multi-reader console output log
//! - `PresenceSet` — who is currently watching an execution
//! - `Subscription` — per-viewer merge of output, presence and lifecycle events
//! - `open_session` — one task per connected client, rendering events through an
//!   injected `EventFormatter` onto a `PushChannel`
//! - `ExecutionRegistry` — `JobId -> JobExecution` lookup for the HTTP layer

pub mod bus;
pub mod error;
pub mod execution;
pub mod formatter;
pub mod metrics;
pub mod output;
pub mod presence;
pub mod registry;
pub mod session;
pub mod types;

pub use bus::Subscription;
pub use error::{FormatError, StreamError};
pub use execution::JobExecution;
pub use formatter::{EventFormatter, EventKind, JsonFormatter, RenderedEvent};
pub use output::{OutputChannel, OutputReader};
pub use presence::{PresenceGuard, PresenceSet, PresenceWatcher};
pub use registry::ExecutionRegistry;
pub use session::{open_session, PushChannel, SessionConfig, SessionState};
pub use types::{JobId, JobStatus, OutputChunk, StreamEvent, Viewer, ViewerId};
