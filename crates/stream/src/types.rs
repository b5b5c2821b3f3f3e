// crates/stream/src/types.rs
//! Shared types for the streaming core.

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

/// Identity of a job whose execution can be watched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Lifecycle status of a job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running = 0,
    Succeeded = 1,
    Failed = 2,
}

impl JobStatus {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => JobStatus::Running,
            1 => JobStatus::Succeeded,
            _ => JobStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

/// Opaque viewer identity (the authenticated user id).
pub type ViewerId = u64;

/// A connected party watching a job execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Viewer {
    pub id: ViewerId,
    pub name: String,
}

impl Viewer {
    pub fn new(id: ViewerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// One immutable unit of console output.
///
/// `seq` is the chunk's position in its channel, starting at 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    seq: u64,
    text: Arc<str>,
}

impl OutputChunk {
    pub(crate) fn new(seq: u64, text: Arc<str>) -> Self {
        Self { seq, text }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Serialize for OutputChunk {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

/// Events delivered to a single subscriber, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The subscriber attached to a running execution.
    Started,
    /// A console output chunk.
    Output(OutputChunk),
    /// The current set of viewers.
    Viewers(Vec<Viewer>),
    /// The execution terminated. Always the last event.
    Finished(JobStatus),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Finished(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_discriminants() {
        assert_eq!(JobStatus::Running as u8, 0);
        assert_eq!(JobStatus::Succeeded as u8, 1);
        assert_eq!(JobStatus::Failed as u8, 2);
        assert_eq!(JobStatus::from_u8(1), JobStatus::Succeeded);
        assert_eq!(JobStatus::from_u8(9), JobStatus::Failed);
    }

    #[test]
    fn test_stream_event_serialize() {
        let chunk = OutputChunk::new(0, Arc::from("build step 1"));
        let json = serde_json::to_string(&StreamEvent::Output(chunk)).unwrap();
        assert_eq!(json, r#"{"event":"output","data":"build step 1"}"#);

        let json = serde_json::to_string(&StreamEvent::Started).unwrap();
        assert_eq!(json, r#"{"event":"started"}"#);

        let json =
            serde_json::to_string(&StreamEvent::Viewers(vec![Viewer::new(7, "ada")])).unwrap();
        assert!(json.contains(r#""data":[{"id":7,"name":"ada"}]"#));

        let json = serde_json::to_string(&StreamEvent::Finished(JobStatus::Failed)).unwrap();
        assert_eq!(json, r#"{"event":"finished","data":"failed"}"#);
    }
}
