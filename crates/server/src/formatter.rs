// crates/server/src/formatter.rs
//! Page-update envelopes for the job and deploy pages.
//!
//! | Event      | Envelope                                   |
//! |------------|--------------------------------------------|
//! | `started`  | `{"title", "html"}`                        |
//! | `output`   | `{"msg"}` (HTML-escaped log line)          |
//! | `viewers`  | `[{"id", "name"}]`                         |
//! | `finished` | `{"title", "notification"?, "html"}`       |
//!
//! `started` and `finished` re-fetch the page data at render time so the
//! header reflects the job's current state.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;

use livewatch_stream::{
    EventFormatter, EventKind, FormatError, JobId, JobStatus, RenderedEvent, StreamEvent,
};

/// Display data for a job page, as rendered by the page layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPage {
    pub title: String,
    /// Pre-rendered header fragment.
    pub header_html: String,
    /// Present for deploy jobs.
    pub deploy: Option<DeployPage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployPage {
    pub title: String,
    /// Desktop notification text shown when the deploy finishes.
    pub notification: String,
}

/// Read-only lookup of job display data.
#[async_trait]
pub trait JobCatalog: Send + Sync {
    async fn page(&self, job_id: &JobId, status: JobStatus) -> Option<JobPage>;
}

/// In-process catalog keyed by job id.
#[derive(Default)]
pub struct MemoryJobCatalog {
    pages: DashMap<JobId, JobPage>,
}

impl MemoryJobCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job_id: JobId, page: JobPage) {
        self.pages.insert(job_id, page);
    }
}

#[async_trait]
impl JobCatalog for MemoryJobCatalog {
    async fn page(&self, job_id: &JobId, status: JobStatus) -> Option<JobPage> {
        let mut page = self.pages.get(job_id)?.clone();
        if status.is_terminal() {
            page.title = format!("{} ({})", page.title, status.as_str());
        }
        Some(page)
    }
}

#[derive(Serialize)]
struct PageEnvelope<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification: Option<&'a str>,
    html: &'a str,
}

#[derive(Serialize)]
struct LogEnvelope {
    msg: String,
}

/// Formatter for one session on a job or deploy page.
pub struct DeployPageFormatter {
    job_id: JobId,
    catalog: Arc<dyn JobCatalog>,
}

impl DeployPageFormatter {
    pub fn new(job_id: JobId, catalog: Arc<dyn JobCatalog>) -> Self {
        Self { job_id, catalog }
    }

    async fn page(&self, kind: EventKind, status: JobStatus) -> Result<JobPage, FormatError> {
        self.catalog
            .page(&self.job_id, status)
            .await
            .ok_or_else(|| FormatError::render(kind, format!("no page data for job {}", self.job_id)))
    }

    async fn started(&self) -> Result<String, FormatError> {
        let page = self.page(EventKind::Started, JobStatus::Running).await?;
        tracing::debug!(job_id = %self.job_id, deploy = page.deploy.is_some(), "rendering started envelope");
        let title = page.deploy.as_ref().map_or(page.title.as_str(), |d| d.title.as_str());
        Ok(serde_json::to_string(&PageEnvelope {
            title,
            notification: None,
            html: &page.header_html,
        })?)
    }

    async fn finished(&self, status: JobStatus) -> Result<String, FormatError> {
        let page = self.page(EventKind::Finished, status).await?;
        let envelope = match &page.deploy {
            Some(deploy) => PageEnvelope {
                title: &deploy.title,
                notification: Some(deploy.notification.as_str()),
                html: &page.header_html,
            },
            None => PageEnvelope {
                title: &page.title,
                notification: None,
                html: &page.header_html,
            },
        };
        Ok(serde_json::to_string(&envelope)?)
    }
}

#[async_trait]
impl EventFormatter for DeployPageFormatter {
    async fn format(&self, event: &StreamEvent) -> Result<RenderedEvent, FormatError> {
        let kind = EventKind::of(event);
        let data = match event {
            StreamEvent::Started => self.started().await?,
            StreamEvent::Viewers(viewers) => serde_json::to_string(viewers)?,
            StreamEvent::Finished(status) => self.finished(*status).await?,
            StreamEvent::Output(chunk) => serde_json::to_string(&LogEnvelope {
                msg: render_log(chunk.text()),
            })?,
        };
        Ok(RenderedEvent::new(kind, data))
    }
}

/// Render one console line for the page: trailing newline dropped, HTML escaped.
pub fn render_log(line: &str) -> String {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    let mut out = String::with_capacity(line.len());
    for c in line.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
