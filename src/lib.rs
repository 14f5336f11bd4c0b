//! linkprint core library
//!
//! Renders pages behind an authenticated session to PDF, in bulk. A CSV
//! export of a tracking spreadsheet lists the pages (a hyperlink column and
//! a display-name column); every valid row becomes one PDF named after the
//! row, rendered by a headless browser carrying the user's session cookies.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`auth`] - Session cookie loading and normalization
//! - [`parser`] - Row source over the CSV input
//! - [`output`] - Output directory cleanup and atomic PDF writes
//! - [`browser`] - Rendering backend traits and the Chromium backend
//! - [`download`] - Bounded-concurrency rendering pool
//! - [`failure`] - Append-only failure ledger
//! - [`batch`] - One complete run from input file to summary

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod batch;
pub mod browser;
pub mod download;
pub mod failure;
pub mod output;
pub mod parser;

// Re-export commonly used types
pub use auth::{CookieError, CookieRecord, CookieSet, load_cookie_file};
pub use batch::{BatchError, BatchPlan, BatchRunner, RunSummary};
pub use browser::{
    BrowserError, ChromiumBackend, LaunchOptions, QuiescencePolicy, RenderBackend, RenderContext,
};
pub use download::{
    ContextPolicy, DEFAULT_CONCURRENCY, DownloadRequest, EngineError, PoolConfig, PoolStats,
    RenderPool, TaskError, TaskId, TaskOutcome, TaskResult,
};
pub use failure::{DEFAULT_LEDGER_PATH, FailureLedger, LedgerEntry, LedgerError};
pub use output::OutputError;
pub use parser::{ColumnNames, ParseError, RecordOptions, RecordSource, SkipReason};
