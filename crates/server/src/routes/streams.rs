// crates/server/src/routes/streams.rs
//! Live job streams.
//!
//! - GET /streams — Running jobs that can be watched
//! - GET /streams/{job_id} — SSE stream of one job's page updates
//! - GET /streams/{job_id}/viewers — Who is watching a job right now

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use livewatch_stream::{open_session, JobExecution, JobId, Viewer};

use crate::error::{ApiError, ApiResult};
use crate::formatter::DeployPageFormatter;
use crate::identity::CurrentUser;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ActiveStream {
    pub job_id: String,
    pub viewers: usize,
}

fn lookup(state: &AppState, job_id: String) -> ApiResult<Arc<JobExecution>> {
    let id = JobId::new(job_id);
    state
        .executions
        .get(&id)
        .ok_or_else(|| ApiError::JobNotFound(id.to_string()))
}

/// GET /api/streams — List running jobs with their viewer counts.
async fn list_streams(State(state): State<Arc<AppState>>) -> Json<Vec<ActiveStream>> {
    let streams = state
        .executions
        .active()
        .into_iter()
        .filter_map(|id| state.executions.get(&id))
        .map(|execution| ActiveStream {
            job_id: execution.id().to_string(),
            viewers: execution.presence().len(),
        })
        .collect();
    Json(streams)
}

/// GET /api/streams/{job_id} — SSE stream for one viewer of one job.
///
/// The session ends when the job finishes, the server shuts down, or the
/// client goes away. Dropping the response body drops the push channel,
/// which is how the session learns about a disconnect.
async fn stream_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    user: CurrentUser,
) -> ApiResult<impl IntoResponse> {
    let execution = lookup(&state, job_id)?;
    let job_id = execution.id().clone();

    tracing::info!(job_id = %job_id, viewer_id = user.id, "viewer connected");

    let formatter = Arc::new(DeployPageFormatter::new(
        job_id.clone(),
        Arc::clone(&state.catalog),
    ));
    let mut channel = open_session(
        execution,
        user.viewer(),
        formatter,
        state.config.session(),
        state.shutdown.child_token(),
    );

    let viewer_id = user.id;
    let stream = async_stream::stream! {
        while let Some(rendered) = channel.recv().await {
            yield Ok::<_, Infallible>(
                Event::default().event(rendered.kind.as_str()).data(rendered.data),
            );
        }
        tracing::debug!(job_id = %job_id, viewer_id, "stream ended");
    };

    let sse = Sse::new(stream).keep_alive(KeepAlive::new().interval(state.config.keepalive));
    Ok(([(header::CACHE_CONTROL, "no-cache")], sse))
}

/// GET /api/streams/{job_id}/viewers — Current viewers of a running job.
async fn list_viewers(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Vec<Viewer>>> {
    let execution = lookup(&state, job_id)?;
    Ok(Json(execution.viewers()))
}

/// Build the streams router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/streams", get(list_streams))
        .route("/streams/{job_id}", get(stream_job))
        .route("/streams/{job_id}/viewers", get(list_viewers))
}
