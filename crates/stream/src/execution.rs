// crates/stream/src/execution.rs
//! The in-flight run of one job, as seen by the streaming core.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::bus::{self, Subscription};
use crate::error::StreamError;
use crate::output::OutputChannel;
use crate::presence::PresenceSet;
use crate::types::{JobId, JobStatus, Viewer};

/// One running (or just terminated) job execution.
///
/// Owned by whatever runs the job; sessions hold an `Arc` for as long as they
/// are attached. The status is an atomic read on every check, so a terminated
/// execution is never reported as running.
pub struct JobExecution {
    id: JobId,
    status: AtomicU8,
    output: Arc<OutputChannel>,
    presence: Arc<PresenceSet>,
    started_at: Instant,
}

impl JobExecution {
    /// Create a running execution with an empty output log and no viewers.
    pub fn start(id: impl Into<JobId>) -> Arc<Self> {
        let id = id.into();
        tracing::info!(job_id = %id, "job execution started");
        Arc::new(Self {
            output: Arc::new(OutputChannel::new(id.clone())),
            presence: Arc::new(PresenceSet::new()),
            status: AtomicU8::new(JobStatus::Running as u8),
            started_at: Instant::now(),
            id,
        })
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn status(&self) -> JobStatus {
        JobStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        !self.status().is_terminal()
    }

    pub fn output(&self) -> &Arc<OutputChannel> {
        &self.output
    }

    pub fn presence(&self) -> &Arc<PresenceSet> {
        &self.presence
    }

    pub fn viewers(&self) -> Vec<Viewer> {
        self.presence.snapshot()
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Producer entry point: append a line of console output.
    pub fn append(&self, text: impl Into<Arc<str>>) -> Result<u64, StreamError> {
        self.output.append(text)
    }

    /// Terminate the execution. Only the first call has an effect.
    ///
    /// The status is stored before the output channel closes, so any reader
    /// that sees end of stream also sees the terminal status.
    pub fn finish(&self, status: JobStatus) -> bool {
        let status = if status.is_terminal() {
            status
        } else {
            tracing::warn!(job_id = %self.id, "finish called with running status, treating as failed");
            JobStatus::Failed
        };
        let transitioned = self
            .status
            .compare_exchange(
                JobStatus::Running as u8,
                status as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !transitioned {
            return false;
        }
        self.output.close();
        tracing::info!(
            job_id = %self.id,
            status = status.as_str(),
            elapsed_secs = self.started_at.elapsed().as_secs_f64(),
            "job execution finished"
        );
        true
    }

    /// Subscribe to this execution's event stream.
    ///
    /// `None` when the job is no longer running.
    pub fn subscribe(self: &Arc<Self>) -> Option<Subscription> {
        bus::subscribe(Arc::clone(self))
    }
}
