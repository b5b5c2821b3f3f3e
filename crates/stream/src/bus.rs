// crates/stream/src/bus.rs
//! Per-subscriber merge of output, presence and lifecycle events.

use std::sync::Arc;

use crate::execution::JobExecution;
use crate::output::OutputReader;
use crate::presence::PresenceWatcher;
use crate::types::{JobId, StreamEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Attached,
    Streaming,
    Retired,
}

/// One subscriber's ordered view of a job execution.
///
/// Yields `Started`, then `Output` and `Viewers` events as they happen, then
/// exactly one `Finished`, then `None` forever.
pub struct Subscription {
    execution: Arc<JobExecution>,
    output: OutputReader,
    presence: PresenceWatcher,
    phase: Phase,
}

/// Subscribe to `execution`. Returns `None` if it is not running.
///
/// The output cursor starts at the current tail. If the job terminates while
/// this call is in progress the subscription still sees the closed channel and
/// finishes right after `Started`.
pub fn subscribe(execution: Arc<JobExecution>) -> Option<Subscription> {
    if !execution.is_running() {
        tracing::debug!(job_id = %execution.id(), "subscribe to terminated job refused");
        return None;
    }
    let presence = execution.presence().subscribe();
    let output = execution.output().open_reader();
    Some(Subscription {
        execution,
        output,
        presence,
        phase: Phase::Attached,
    })
}

impl Subscription {
    pub fn job_id(&self) -> &JobId {
        self.execution.id()
    }

    pub fn execution(&self) -> &Arc<JobExecution> {
        &self.execution
    }

    pub fn is_retired(&self) -> bool {
        self.phase == Phase::Retired
    }

    /// Wait for the next event. Cancel-safe.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        match self.phase {
            Phase::Retired => return None,
            Phase::Attached => {
                self.phase = Phase::Streaming;
                return Some(StreamEvent::Started);
            }
            Phase::Streaming => {}
        }

        tokio::select! {
            // Output first: on close every buffered chunk is drained before
            // `Finished` goes out.
            biased;
            chunk = self.output.read_next() => match chunk {
                Some(chunk) => Some(StreamEvent::Output(chunk)),
                None => {
                    self.phase = Phase::Retired;
                    Some(StreamEvent::Finished(self.execution.status()))
                }
            },
            Some(viewers) = self.presence.changed() => Some(StreamEvent::Viewers(viewers)),
        }
    }
}
