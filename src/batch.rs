//! One complete run: read rows, prepare the output directory, render every
//! valid row and report the totals.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::auth::CookieSet;
use crate::browser::RenderBackend;
use crate::download::{EngineError, PoolConfig, PoolStats, RenderPool, TaskResult};
use crate::failure::FailureLedger;
use crate::output::{self, OutputError};
use crate::parser::{ParseError, RecordSource, SkippedRow};

/// Errors that abort a run before or instead of rendering.
///
/// Per-row problems never show up here; they are skips or ledger entries.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The input file is unusable.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The output directory could not be prepared.
    #[error(transparent)]
    Output(#[from] OutputError),

    /// The pool could not be built.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Everything a run needs besides the input rows and the browser.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    /// Directory that receives the PDFs. Cleared of regular files first.
    pub output_dir: PathBuf,
    /// Failure ledger file.
    pub ledger_path: PathBuf,
    /// Normalized session cookies injected into every context.
    pub cookies: CookieSet,
    /// Pool settings.
    pub pool: PoolConfig,
}

/// Totals reported at the end of a run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Data rows read from the input.
    pub total_rows: usize,
    /// Rows rejected before rendering.
    pub skipped: Vec<SkippedRow>,
    /// PDFs written.
    pub succeeded: usize,
    /// Tasks that failed (each has a ledger entry).
    pub failed: usize,
    /// Canonical output directory.
    pub output_dir: PathBuf,
    /// Ledger path failures were appended to.
    pub ledger_path: PathBuf,
    /// Per-task results in row order.
    pub results: Vec<TaskResult>,
}

impl RunSummary {
    /// Number of rows handed to the pool.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Iterates over failed results.
    pub fn failures(&self) -> impl Iterator<Item = &TaskResult> {
        self.results.iter().filter(|result| !result.is_success())
    }
}

/// Drives one run against a rendering backend.
pub struct BatchRunner {
    plan: BatchPlan,
    backend: Arc<dyn RenderBackend>,
    stats: Arc<PoolStats>,
}

impl std::fmt::Debug for BatchRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchRunner")
            .field("plan", &self.plan)
            .finish_non_exhaustive()
    }
}

impl BatchRunner {
    /// Creates a runner. Nothing is read or written until [`Self::run`].
    #[must_use]
    pub fn new(plan: BatchPlan, backend: Arc<dyn RenderBackend>) -> Self {
        Self {
            plan,
            backend,
            stats: Arc::new(PoolStats::new()),
        }
    }

    /// Live counters of the run, usable before and during [`Self::run`].
    #[must_use]
    pub fn stats(&self) -> Arc<PoolStats> {
        Arc::clone(&self.stats)
    }

    /// Runs the batch to completion and shuts the backend down.
    ///
    /// Rows are read in full before anything is rendered, so an unreadable
    /// input aborts the run before the output directory is touched.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError`] if the input cannot be read, the output
    /// directory cannot be prepared, or the pool settings are invalid.
    /// Individual page failures are not errors.
    #[instrument(skip_all, fields(input = %source.path().display()))]
    pub async fn run(&self, source: &RecordSource) -> Result<RunSummary, BatchError> {
        let batch = source.collect()?;
        let output_dir = output::prepare(&self.plan.output_dir)?;
        let ledger = Arc::new(FailureLedger::new(self.plan.ledger_path.clone()));

        let mut pool = RenderPool::with_stats(
            self.plan.pool,
            Arc::clone(&self.backend),
            Arc::clone(&self.plan.cookies),
            output_dir.clone(),
            ledger,
            Arc::clone(&self.stats),
        )?;

        let total_rows = batch.total_rows();
        for request in batch.requests {
            pool.enqueue(request)?;
        }
        info!(
            tasks = self.stats.enqueued(),
            concurrency = pool.concurrency(),
            "Rendering pages"
        );

        let results = pool.drain().await;
        if let Err(error) = pool.close().await {
            warn!(%error, "Browser shutdown reported an error");
        }

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let failed = results.len() - succeeded;
        info!(
            total_rows,
            skipped = batch.skipped.len(),
            succeeded,
            failed,
            "Run complete"
        );

        Ok(RunSummary {
            total_rows,
            skipped: batch.skipped,
            succeeded,
            failed,
            output_dir,
            ledger_path: self.plan.ledger_path.clone(),
            results,
        })
    }
}
