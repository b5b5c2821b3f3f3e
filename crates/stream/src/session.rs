// crates/stream/src/session.rs
//! One connected client watching one job execution.
//!
//! `open_session` attaches synchronously (liveness check, presence join) and
//! then spawns a task that pulls events from the subscription, renders them
//! through the injected formatter and writes them to the client's push
//! channel. The task ends on `Finished`, when the client drops its end of the
//! push channel, when the cancellation token fires, or when a write fails.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::bus::Subscription;
use crate::execution::JobExecution;
use crate::formatter::{EventFormatter, EventKind, RenderedEvent};
use crate::metrics;
use crate::presence::PresenceGuard;
use crate::types::{JobId, StreamEvent, Viewer, ViewerId};

/// Default capacity of a session's push channel.
pub const DEFAULT_PUSH_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Rendered events buffered ahead of the client before writes wait.
    pub push_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            push_buffer: DEFAULT_PUSH_BUFFER,
        }
    }
}

/// Lifecycle of a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Attaching,
    Active,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    NotRunning,
    Finished,
    Disconnected,
    Cancelled,
    WriteFailed,
    Dropped,
}

impl CloseReason {
    fn as_str(&self) -> &'static str {
        match self {
            CloseReason::NotRunning => "not_running",
            CloseReason::Finished => "finished",
            CloseReason::Disconnected => "disconnected",
            CloseReason::Cancelled => "cancelled",
            CloseReason::WriteFailed => "write_failed",
            CloseReason::Dropped => "dropped",
        }
    }
}

/// The client's end of a session: rendered events in delivery order.
///
/// Dropping it is how a client disconnect reaches the session.
pub struct PushChannel {
    rx: mpsc::Receiver<RenderedEvent>,
    state: watch::Receiver<SessionState>,
}

impl PushChannel {
    /// Next rendered event, or `None` once the session closed the channel.
    pub async fn recv(&mut self) -> Option<RenderedEvent> {
        self.rx.recv().await
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait until the session reaches `Closed`.
    pub async fn wait_closed(&mut self) {
        // An error means the session was dropped, which also closes it.
        let _ = self
            .state
            .wait_for(|state| *state == SessionState::Closed)
            .await;
    }

    /// Watch the session state independently of the event stream.
    pub fn state_watcher(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }
}

impl Stream for PushChannel {
    type Item = RenderedEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Open a stream session for `viewer` on `execution`.
///
/// If the job is not running the returned channel is already closed and no
/// event is ever delivered. Otherwise the viewer is in the execution's
/// presence set when this returns. Must be called inside a Tokio runtime.
pub fn open_session(
    execution: Arc<JobExecution>,
    viewer: Viewer,
    formatter: Arc<dyn EventFormatter>,
    config: SessionConfig,
    cancel: CancellationToken,
) -> PushChannel {
    let (tx, rx) = mpsc::channel(config.push_buffer.max(1));
    let (state_tx, state_rx) = watch::channel(SessionState::Attaching);
    let channel = PushChannel {
        rx,
        state: state_rx,
    };

    let job_id = execution.id().clone();
    let Some(subscription) = execution.subscribe() else {
        tracing::debug!(job_id = %job_id, viewer_id = viewer.id, "job not running, closing stream");
        let _ = state_tx.send(SessionState::Closed);
        return channel;
    };

    // Subscribe first, then join: our own join shows up in our own presence
    // stream and is filtered out at render time.
    let guard = execution.presence().enter(viewer.clone());
    let _ = state_tx.send(SessionState::Active);
    metrics::session_opened();
    tracing::info!(job_id = %job_id, viewer_id = viewer.id, "stream session opened");

    let session = StreamSession {
        job_id,
        viewer_id: viewer.id,
        subscription,
        formatter,
        tx: Some(tx),
        guard: Some(guard),
        state: state_tx,
        cancel,
        last_viewers: Vec::new(),
    };
    tokio::spawn(session.run());
    channel
}

struct StreamSession {
    job_id: JobId,
    viewer_id: ViewerId,
    subscription: Subscription,
    formatter: Arc<dyn EventFormatter>,
    tx: Option<mpsc::Sender<RenderedEvent>>,
    guard: Option<PresenceGuard>,
    state: watch::Sender<SessionState>,
    cancel: CancellationToken,
    /// Other viewers as last rendered to this client.
    last_viewers: Vec<Viewer>,
}

enum Delivery {
    Sent,
    Skipped,
    Failed(CloseReason),
}

impl StreamSession {
    async fn run(mut self) {
        let reason = loop {
            let Some(tx) = self.tx.clone() else {
                break CloseReason::Dropped;
            };
            let event = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break CloseReason::Cancelled,
                _ = tx.closed() => break CloseReason::Disconnected,
                event = self.subscription.next() => event,
            };
            let Some(event) = event else {
                break CloseReason::Finished;
            };

            let terminal = event.is_terminal();
            match self.deliver(&tx, event).await {
                Delivery::Sent | Delivery::Skipped => {}
                Delivery::Failed(reason) => break reason,
            }
            if terminal {
                break CloseReason::Finished;
            }
        };
        self.close(reason);
    }

    async fn deliver(&mut self, tx: &mpsc::Sender<RenderedEvent>, event: StreamEvent) -> Delivery {
        let Some(event) = self.personalize(event) else {
            return Delivery::Skipped;
        };
        let kind = EventKind::of(&event);

        let rendered = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Delivery::Failed(CloseReason::Cancelled),
            _ = tx.closed() => return Delivery::Failed(CloseReason::Disconnected),
            rendered = self.formatter.format(&event) => rendered,
        };
        let rendered = match rendered {
            Ok(rendered) => rendered,
            Err(e) => {
                metrics::format_failed(kind);
                tracing::warn!(
                    job_id = %self.job_id,
                    viewer_id = self.viewer_id,
                    kind = kind.as_str(),
                    error = %e,
                    "formatter failed, skipping event"
                );
                return Delivery::Skipped;
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Delivery::Failed(CloseReason::Cancelled),
            sent = tx.send(rendered) => match sent {
                Ok(()) => {
                    metrics::event_delivered(kind);
                    Delivery::Sent
                }
                Err(_) => Delivery::Failed(CloseReason::WriteFailed),
            },
        }
    }

    /// Apply this client's view: drop our own identity from viewer lists and
    /// skip lists identical to the one the client already has.
    fn personalize(&mut self, event: StreamEvent) -> Option<StreamEvent> {
        let StreamEvent::Viewers(viewers) = event else {
            return Some(event);
        };
        let others: Vec<Viewer> = viewers
            .into_iter()
            .filter(|viewer| viewer.id != self.viewer_id)
            .collect();
        if others == self.last_viewers {
            return None;
        }
        self.last_viewers = others.clone();
        Some(StreamEvent::Viewers(others))
    }

    /// Leave presence, close the push channel, then publish `Closed`.
    /// Safe to call more than once.
    fn close(&mut self, reason: CloseReason) {
        if *self.state.borrow() == SessionState::Closed {
            return;
        }
        self.state.send_replace(SessionState::Closing);
        if let Some(guard) = self.guard.take() {
            guard.release();
        }
        self.tx = None;
        self.state.send_replace(SessionState::Closed);
        metrics::session_closed();

        if reason == CloseReason::Finished {
            tracing::info!(job_id = %self.job_id, viewer_id = self.viewer_id, "stream session finished");
        } else {
            tracing::debug!(
                job_id = %self.job_id,
                viewer_id = self.viewer_id,
                reason = reason.as_str(),
                "stream session closed"
            );
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.close(CloseReason::Dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormatError;
    use crate::formatter::JsonFormatter;
    use crate::types::JobStatus;
    use std::time::Duration;

    fn json() -> Arc<dyn EventFormatter> {
        Arc::new(JsonFormatter)
    }

    async fn recv(channel: &mut PushChannel) -> Option<RenderedEvent> {
        tokio::time::timeout(Duration::from_millis(500), channel.recv())
            .await
            .expect("timeout waiting for push")
    }

    #[tokio::test]
    async fn test_not_running_closes_immediately() {
        let execution = JobExecution::start("job-1");
        execution.finish(JobStatus::Succeeded);

        let mut channel = open_session(
            Arc::clone(&execution),
            Viewer::new(1, "ada"),
            json(),
            SessionConfig::default(),
            CancellationToken::new(),
        );
        assert_eq!(channel.state(), SessionState::Closed);
        assert_eq!(recv(&mut channel).await, None);
        assert!(execution.presence().is_empty());
    }

    #[tokio::test]
    async fn test_started_then_finished_closes_channel() {
        let execution = JobExecution::start("job-2");
        let mut channel = open_session(
            Arc::clone(&execution),
            Viewer::new(1, "ada"),
            json(),
            SessionConfig::default(),
            CancellationToken::new(),
        );
        assert!(execution.presence().contains(1));
        assert_eq!(recv(&mut channel).await.unwrap().kind, EventKind::Started);

        execution.append("step").unwrap();
        assert_eq!(recv(&mut channel).await.unwrap().data, r#"{"msg":"step"}"#);

        execution.finish(JobStatus::Succeeded);
        assert_eq!(recv(&mut channel).await.unwrap().kind, EventKind::Finished);
        assert_eq!(recv(&mut channel).await, None);

        channel.wait_closed().await;
        assert!(execution.presence().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_removes_viewer() {
        let execution = JobExecution::start("job-3");
        let mut channel = open_session(
            Arc::clone(&execution),
            Viewer::new(7, "grace"),
            json(),
            SessionConfig::default(),
            CancellationToken::new(),
        );
        assert_eq!(recv(&mut channel).await.unwrap().kind, EventKind::Started);
        let mut state = channel.state_watcher();
        drop(channel);

        tokio::time::timeout(
            Duration::from_millis(500),
            state.wait_for(|s| *s == SessionState::Closed),
        )
        .await
        .expect("session did not notice disconnect")
        .ok();
        assert!(execution.presence().is_empty());
        assert!(execution.is_running());
    }

    #[tokio::test]
    async fn test_cancel_token_closes_session() {
        let execution = JobExecution::start("job-4");
        let cancel = CancellationToken::new();
        let mut channel = open_session(
            Arc::clone(&execution),
            Viewer::new(1, "ada"),
            json(),
            SessionConfig::default(),
            cancel.clone(),
        );
        assert_eq!(recv(&mut channel).await.unwrap().kind, EventKind::Started);

        cancel.cancel();
        assert_eq!(recv(&mut channel).await, None);
        channel.wait_closed().await;
        assert!(execution.presence().is_empty());
    }

    #[tokio::test]
    async fn test_formatter_failure_skips_event() {
        let execution = JobExecution::start("job-5");
        let formatter = |event: &StreamEvent| -> Result<RenderedEvent, FormatError> {
            match event {
                StreamEvent::Output(chunk) if chunk.text() == "bad" => {
                    Err(FormatError::render(EventKind::Output, "unrenderable"))
                }
                StreamEvent::Output(chunk) => Ok(RenderedEvent::new(EventKind::Output, chunk.text())),
                other => Ok(RenderedEvent::new(EventKind::of(other), "")),
            }
        };
        let mut channel = open_session(
            Arc::clone(&execution),
            Viewer::new(1, "ada"),
            Arc::new(formatter),
            SessionConfig::default(),
            CancellationToken::new(),
        );
        assert_eq!(recv(&mut channel).await.unwrap().kind, EventKind::Started);

        execution.append("good 1").unwrap();
        execution.append("bad").unwrap();
        execution.append("good 2").unwrap();

        assert_eq!(recv(&mut channel).await.unwrap().data, "good 1");
        assert_eq!(recv(&mut channel).await.unwrap().data, "good 2");
    }

    #[tokio::test]
    async fn test_failing_finished_formatter_still_closes() {
        let execution = JobExecution::start("job-6");
        let formatter = |event: &StreamEvent| -> Result<RenderedEvent, FormatError> {
            match event {
                StreamEvent::Finished(_) => Err(FormatError::Lookup("job record gone".into())),
                other => Ok(RenderedEvent::new(EventKind::of(other), "")),
            }
        };
        let mut channel = open_session(
            Arc::clone(&execution),
            Viewer::new(1, "ada"),
            Arc::new(formatter),
            SessionConfig::default(),
            CancellationToken::new(),
        );
        assert_eq!(recv(&mut channel).await.unwrap().kind, EventKind::Started);

        execution.finish(JobStatus::Failed);
        assert_eq!(recv(&mut channel).await, None);
        channel.wait_closed().await;
        assert!(execution.presence().is_empty());
    }

    #[tokio::test]
    async fn test_own_join_is_not_rendered() {
        let execution = JobExecution::start("job-7");
        let mut channel = open_session(
            Arc::clone(&execution),
            Viewer::new(1, "ada"),
            json(),
            SessionConfig::default(),
            CancellationToken::new(),
        );
        assert_eq!(recv(&mut channel).await.unwrap().kind, EventKind::Started);

        // Only our own join so far: nothing to render.
        execution.append("marker").unwrap();
        assert_eq!(recv(&mut channel).await.unwrap().kind, EventKind::Output);
    }

    #[tokio::test]
    async fn test_slow_client_does_not_block_producer() {
        let execution = JobExecution::start("job-8");
        let mut channel = open_session(
            Arc::clone(&execution),
            Viewer::new(1, "ada"),
            json(),
            SessionConfig { push_buffer: 1 },
            CancellationToken::new(),
        );

        for i in 0..1_000 {
            execution.append(format!("line {i}")).unwrap();
        }
        execution.finish(JobStatus::Succeeded);

        let mut outputs = 0;
        while let Some(event) = recv(&mut channel).await {
            if event.kind == EventKind::Output {
                outputs += 1;
            }
        }
        assert_eq!(outputs, 1_000);
    }
}
