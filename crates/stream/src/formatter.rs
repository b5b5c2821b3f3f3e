// crates/stream/src/formatter.rs
//! Mapping of stream events onto their wire representation.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::FormatError;
use crate::types::{OutputChunk, StreamEvent};

/// Wire name of a stream event (the SSE `event:` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Output,
    Viewers,
    Finished,
}

impl EventKind {
    pub fn of(event: &StreamEvent) -> Self {
        match event {
            StreamEvent::Started => EventKind::Started,
            StreamEvent::Output(_) => EventKind::Output,
            StreamEvent::Viewers(_) => EventKind::Viewers,
            StreamEvent::Finished(_) => EventKind::Finished,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Started => "started",
            EventKind::Output => "output",
            EventKind::Viewers => "viewers",
            EventKind::Finished => "finished",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One event rendered for the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEvent {
    pub kind: EventKind,
    pub data: String,
}

impl RenderedEvent {
    pub fn new(kind: EventKind, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    /// Generic wrapper for a log line: `{"msg": "<text>"}`.
    pub fn message(chunk: &OutputChunk) -> Result<Self, FormatError> {
        let data = serde_json::to_string(&serde_json::json!({ "msg": chunk.text() }))?;
        Ok(Self::new(EventKind::Output, data))
    }
}

/// Renders events for one session.
///
/// Implementations may perform read-only lookups (e.g. re-fetching page data)
/// but must not mutate the execution or its viewers. A failure skips the event;
/// a failure on `Finished` still ends the session.
#[async_trait]
pub trait EventFormatter: Send + Sync {
    async fn format(&self, event: &StreamEvent) -> Result<RenderedEvent, FormatError>;
}

#[async_trait]
impl<F> EventFormatter for F
where
    F: Fn(&StreamEvent) -> Result<RenderedEvent, FormatError> + Send + Sync,
{
    async fn format(&self, event: &StreamEvent) -> Result<RenderedEvent, FormatError> {
        (self)(event)
    }
}

/// Renders every event as its plain JSON serialization.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

#[async_trait]
impl EventFormatter for JsonFormatter {
    async fn format(&self, event: &StreamEvent) -> Result<RenderedEvent, FormatError> {
        let kind = EventKind::of(event);
        let data = match event {
            StreamEvent::Output(chunk) => return RenderedEvent::message(chunk),
            StreamEvent::Started => "{}".to_string(),
            StreamEvent::Viewers(viewers) => serde_json::to_string(viewers)?,
            StreamEvent::Finished(status) => {
                serde_json::to_string(&serde_json::json!({ "status": status }))?
            }
        };
        Ok(RenderedEvent::new(kind, data))
    }
}
