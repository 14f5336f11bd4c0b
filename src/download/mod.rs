//! Concurrent rendering of pages to PDF files.
//!
//! This module owns the request/result types and the [`RenderPool`] that
//! turns each [`DownloadRequest`] into a PDF in the output directory.
//!
//! # Features
//!
//! - Bounded concurrency (10 pages at once by default)
//! - One isolated browser context per task, or reset-and-reuse on request
//! - Navigation bounded by a timeout, completed on network quiescence
//! - Per-task failures recorded in the failure ledger, never fatal to the batch

mod constants;
mod engine;
mod error;
mod request;

pub use constants::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};
pub use engine::{ContextPolicy, EngineError, PoolConfig, PoolStats, RenderPool};
pub use error::TaskError;
pub use request::{
    DownloadRequest, PDF_SUFFIX, RequestError, TaskId, TaskOutcome, TaskResult,
};
