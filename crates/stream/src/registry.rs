// crates/stream/src/registry.rs
//! Lookup of running executions by job id.

use std::sync::Arc;

use dashmap::DashMap;

use crate::error::StreamError;
use crate::execution::JobExecution;
use crate::types::{JobId, JobStatus};

/// Shared map of executions that sessions can attach to.
///
/// Cheap to clone; all clones share one map.
#[derive(Clone, Default)]
pub struct ExecutionRegistry {
    executions: Arc<DashMap<JobId, Arc<JobExecution>>>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start and register an execution for `id`.
    ///
    /// Fails if a running execution is already registered under that id; a
    /// terminated one is replaced.
    pub fn start(&self, id: impl Into<JobId>) -> Result<Arc<JobExecution>, StreamError> {
        let id = id.into();
        match self.executions.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if entry.get().is_running() {
                    return Err(StreamError::AlreadyRunning(id));
                }
                let execution = JobExecution::start(id);
                entry.insert(Arc::clone(&execution));
                Ok(execution)
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let execution = JobExecution::start(id);
                entry.insert(Arc::clone(&execution));
                Ok(execution)
            }
        }
    }

    pub fn get(&self, id: &JobId) -> Option<Arc<JobExecution>> {
        self.executions.get(id).map(|e| Arc::clone(e.value()))
    }

    /// Terminate and unregister the execution for `id`.
    ///
    /// Attached sessions keep their own `Arc` and still receive `finished`.
    pub fn finish(&self, id: &JobId, status: JobStatus) -> Result<(), StreamError> {
        let (_, execution) = self
            .executions
            .remove(id)
            .ok_or_else(|| StreamError::NotRunning(id.clone()))?;
        if execution.finish(status) {
            Ok(())
        } else {
            Err(StreamError::NotRunning(id.clone()))
        }
    }

    /// Ids of every registered execution that is still running.
    pub fn active(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .executions
            .iter()
            .filter(|e| e.value().is_running())
            .map(|e| e.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Drop executions that terminated without going through `finish`.
    pub fn prune(&self) -> usize {
        let before = self.executions.len();
        self.executions.retain(|_, execution| execution.is_running());
        let pruned = before - self.executions.len();
        if pruned > 0 {
            tracing::debug!(pruned, "pruned terminated executions");
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }
}
