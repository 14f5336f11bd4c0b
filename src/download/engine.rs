//! Bounded-concurrency rendering pool.
//!
//! The [`RenderPool`] runs one Tokio task per enqueued request, with a
//! semaphore limiting how many render at once. Each task obtains a browser
//! context, injects the session cookies, waits for the page to settle,
//! prints it and writes the PDF. Failures are appended to the failure ledger
//! by the task itself, so they are durable even if the pool is never drained.
//!
//! # Concurrency Model
//!
//! - Each request runs in its own Tokio task, spawned at enqueue time
//! - A semaphore permit is acquired before the task touches the browser
//! - Permits are released automatically when the task ends (RAII)
//! - The semaphore is fair, so tasks start in enqueue order
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use linkprint_core::auth::CookieSet;
//! use linkprint_core::browser::{ChromiumBackend, LaunchOptions};
//! use linkprint_core::download::{DownloadRequest, PoolConfig, RenderPool};
//! use linkprint_core::failure::FailureLedger;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(ChromiumBackend::launch(LaunchOptions::default()).await?);
//! let cookies: CookieSet = Arc::from(Vec::new());
//! let ledger = Arc::new(FailureLedger::new("data/failed_downloads.csv"));
//! let mut pool = RenderPool::new(PoolConfig::default(), backend, cookies, "./pdfs".into(), ledger)?;
//! pool.enqueue(DownloadRequest::new("https://example.com", "Example", 1)?)?;
//! let results = pool.drain().await;
//! pool.close().await?;
//! # Ok(())
//! # }
//! ```

mod contexts;
mod task;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

pub use contexts::ContextPolicy;

use self::contexts::ContextPool;
use self::task::{TaskShared, handle_task_join_error, run_task};
use super::constants::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};
use super::{DownloadRequest, TaskId, TaskResult};
use crate::auth::CookieSet;
use crate::browser::{BrowserError, QuiescencePolicy, RenderBackend};
use crate::failure::FailureLedger;

/// Error type for pool operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The pool was closed and accepts no more work.
    #[error("render pool is closed")]
    Closed,

    /// The rendering backend failed to shut down cleanly.
    #[error("backend shutdown failed: {0}")]
    Shutdown(#[source] BrowserError),
}

/// Pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of tasks rendering at once.
    pub max_concurrency: usize,
    /// Context assignment policy.
    pub context_policy: ContextPolicy,
    /// Navigation completion rule and timeout.
    pub quiescence: QuiescencePolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_CONCURRENCY,
            context_policy: ContextPolicy::default(),
            quiescence: QuiescencePolicy::default(),
        }
    }
}

/// Live counters for a pool.
///
/// Shared through an `Arc` so a progress display can poll it while tasks run.
#[derive(Debug, Default)]
pub struct PoolStats {
    enqueued: AtomicUsize,
    running: AtomicUsize,
    peak_running: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl PoolStats {
    /// Creates a tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests accepted so far.
    #[must_use]
    pub fn enqueued(&self) -> usize {
        self.enqueued.load(Ordering::SeqCst)
    }

    /// Number of tasks currently holding a slot.
    #[must_use]
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Highest number of tasks that ever held a slot at once.
    #[must_use]
    pub fn peak_running(&self) -> usize {
        self.peak_running.load(Ordering::SeqCst)
    }

    /// Number of PDFs written.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    /// Number of failed tasks.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Number of tasks that reached a terminal outcome.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.succeeded() + self.failed()
    }

    fn increment_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn start_running(&self) -> RunningGuard<'_> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(now, Ordering::SeqCst);
        RunningGuard { stats: self }
    }
}

/// Decrements the running count when dropped, including during unwinding.
struct RunningGuard<'a> {
    stats: &'a PoolStats,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.stats.running.fetch_sub(1, Ordering::SeqCst);
    }
}

struct PendingTask {
    id: TaskId,
    request: DownloadRequest,
    handle: JoinHandle<TaskResult>,
}

/// Bounded-concurrency pool of rendering tasks.
pub struct RenderPool {
    semaphore: Arc<Semaphore>,
    config: PoolConfig,
    shared: Arc<TaskShared>,
    pending: Vec<PendingTask>,
    next_id: u64,
    closed: bool,
}

impl std::fmt::Debug for RenderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPool")
            .field("config", &self.config)
            .field("pending", &self.pending.len())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl RenderPool {
    /// Creates a pool. No browser context is opened until work arrives.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if `max_concurrency` is
    /// outside the valid range (1-100).
    pub fn new(
        config: PoolConfig,
        backend: Arc<dyn RenderBackend>,
        cookies: CookieSet,
        output_dir: PathBuf,
        ledger: Arc<FailureLedger>,
    ) -> Result<Self, EngineError> {
        Self::with_stats(
            config,
            backend,
            cookies,
            output_dir,
            ledger,
            Arc::new(PoolStats::new()),
        )
    }

    /// Like [`Self::new`], but reports into an existing [`PoolStats`] so an
    /// observer can hold the counters before the pool exists.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if `max_concurrency` is
    /// outside the valid range (1-100).
    #[instrument(level = "debug", skip(backend, cookies, ledger, stats), fields(output_dir = %output_dir.display()))]
    pub fn with_stats(
        config: PoolConfig,
        backend: Arc<dyn RenderBackend>,
        cookies: CookieSet,
        output_dir: PathBuf,
        ledger: Arc<FailureLedger>,
        stats: Arc<PoolStats>,
    ) -> Result<Self, EngineError> {
        let concurrency = config.max_concurrency;
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            context_policy = %config.context_policy,
            timeout_ms = config.quiescence.timeout.as_millis(),
            cookies = cookies.len(),
            "creating render pool"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            config,
            shared: Arc::new(TaskShared {
                backend,
                cookies,
                output_dir,
                ledger,
                quiescence: config.quiescence,
                contexts: ContextPool::new(config.context_policy),
                stats,
            }),
            pending: Vec::new(),
            next_id: 0,
            closed: false,
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.config.max_concurrency
    }

    /// Returns a handle to the live counters.
    #[must_use]
    pub fn stats(&self) -> Arc<PoolStats> {
        Arc::clone(&self.shared.stats)
    }

    /// Accepts a request and returns immediately.
    ///
    /// The task starts as soon as a slot is free.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Closed`] after [`Self::close`].
    pub fn enqueue(&mut self, request: DownloadRequest) -> Result<TaskId, EngineError> {
        if self.closed {
            return Err(EngineError::Closed);
        }
        self.next_id += 1;
        let id = TaskId(self.next_id);
        self.shared.stats.increment_enqueued();

        let handle = tokio::spawn(run_task(
            Arc::clone(&self.shared),
            Arc::clone(&self.semaphore),
            id,
            request.clone(),
        ));
        debug!(task = %id, url = request.url(), "enqueued request");
        self.pending.push(PendingTask {
            id,
            request,
            handle,
        });
        Ok(id)
    }

    /// Waits for every task enqueued before this call and returns their
    /// results in enqueue order. A panicking task yields a failed result.
    pub async fn drain(&mut self) -> Vec<TaskResult> {
        let pending = std::mem::take(&mut self.pending);
        debug!(task_count = pending.len(), "waiting for tasks to complete");

        let mut results = Vec::with_capacity(pending.len());
        for PendingTask {
            id,
            request,
            handle,
        } in pending
        {
            let result = match handle.await {
                Ok(result) => result,
                Err(error) => {
                    warn!(task = %id, error = %error, "render task did not complete");
                    handle_task_join_error(&self.shared, id, request, error).await
                }
            };
            results.push(result);
        }

        let stats = &self.shared.stats;
        info!(
            succeeded = stats.succeeded(),
            failed = stats.failed(),
            peak_running = stats.peak_running(),
            "render pool drained"
        );
        results
    }

    /// Stops accepting work, abandons undrained tasks and shuts the backend down.
    ///
    /// Calling this more than once is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Shutdown`] if the backend reports a shutdown failure.
    pub async fn close(&mut self) -> Result<(), EngineError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.semaphore.close();
        for task in self.pending.drain(..) {
            debug!(task = %task.id, "abandoning undrained task");
            task.handle.abort();
        }
        self.shared.contexts.close_all().await;
        self.shared
            .backend
            .shutdown()
            .await
            .map_err(EngineError::Shutdown)
    }
}

impl Drop for RenderPool {
    fn drop(&mut self) {
        for task in &self.pending {
            task.handle.abort();
        }
    }
}
