//! The sequence one worker runs for one request.

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{info, instrument, warn};

use super::PoolStats;
use super::contexts::ContextPool;
use crate::auth::CookieSet;
use crate::browser::{QuiescencePolicy, RenderBackend, RenderContext};
use crate::download::{DownloadRequest, TaskError, TaskId, TaskOutcome, TaskResult};
use crate::failure::FailureLedger;
use crate::output;

/// State shared by every task of one pool.
pub(super) struct TaskShared {
    pub(super) backend: Arc<dyn RenderBackend>,
    pub(super) cookies: CookieSet,
    pub(super) output_dir: PathBuf,
    pub(super) ledger: Arc<FailureLedger>,
    pub(super) quiescence: QuiescencePolicy,
    pub(super) contexts: ContextPool,
    pub(super) stats: Arc<PoolStats>,
}

/// Waits for a slot, renders the request and records the outcome.
#[instrument(skip_all, fields(task = %id, host = %host_of(request.url()), url = %request.url(), filename = %request.filename()))]
pub(super) async fn run_task(
    shared: Arc<TaskShared>,
    semaphore: Arc<Semaphore>,
    id: TaskId,
    request: DownloadRequest,
) -> TaskResult {
    let result = match semaphore.acquire_owned().await {
        Ok(_permit) => {
            let _running = shared.stats.start_running();
            render_request(&shared, &request).await
        }
        Err(_) => Err(TaskError::Cancelled),
    };
    finish(&shared, id, request, result).await
}

/// Host part of a URL for log fields; the raw value when it does not parse.
fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(ToString::to_string))
        .unwrap_or_else(|| url.to_string())
}

async fn render_request(
    shared: &TaskShared,
    request: &DownloadRequest,
) -> Result<PathBuf, TaskError> {
    let mut context = shared
        .contexts
        .checkout(shared.backend.as_ref(), &shared.cookies)
        .await?;
    let rendered = render_in_context(context.as_mut(), request.url(), shared.quiescence).await;
    let healthy = rendered.is_ok();
    let written = match rendered {
        Ok(bytes) => output::write_pdf(&shared.output_dir, request.filename(), bytes)
            .await
            .map_err(TaskError::write),
        Err(error) => Err(error),
    };
    shared.contexts.checkin(context, healthy).await;
    written
}

async fn render_in_context(
    context: &mut dyn RenderContext,
    url: &str,
    policy: QuiescencePolicy,
) -> Result<Vec<u8>, TaskError> {
    match tokio::time::timeout(policy.timeout, context.navigate(url, &policy)).await {
        Err(_) => return Err(TaskError::timeout(policy.timeout)),
        Ok(Err(source)) => return Err(TaskError::navigation(source)),
        Ok(Ok(())) => {}
    }
    context.render_pdf().await.map_err(TaskError::render)
}

async fn finish(
    shared: &TaskShared,
    id: TaskId,
    request: DownloadRequest,
    result: Result<PathBuf, TaskError>,
) -> TaskResult {
    let outcome = match result {
        Ok(path) => {
            shared.stats.increment_succeeded();
            info!(path = %path.display(), "Saved PDF");
            TaskOutcome::Success
        }
        Err(error) => record_failure(shared, &request, &error).await,
    };
    TaskResult {
        id,
        request,
        outcome,
    }
}

async fn record_failure(
    shared: &TaskShared,
    request: &DownloadRequest,
    error: &TaskError,
) -> TaskOutcome {
    shared.stats.increment_failed();
    let reason = error.to_string();
    warn!(kind = error.kind(), error = %reason, "Failed to render page");
    Arc::clone(&shared.ledger)
        .append(request.url(), request.filename(), &reason)
        .await;
    TaskOutcome::Failure { reason }
}

/// Converts a task that never returned a result into a failure.
pub(super) async fn handle_task_join_error(
    shared: &TaskShared,
    id: TaskId,
    request: DownloadRequest,
    error: JoinError,
) -> TaskResult {
    let error = if error.is_panic() {
        TaskError::panicked(panic_message(error.into_panic()))
    } else {
        TaskError::Cancelled
    };
    let outcome = record_failure(shared, &request, &error).await;
    TaskResult {
        id,
        request,
        outcome,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&str>()
            .map_or_else(|| "unknown panic".to_string(), |s| (*s).to_string()),
    }
}
