//! Tabular input parsing.
//!
//! Reads a CSV export of the tracking spreadsheet (header row required) and
//! turns each data row into either a [`DownloadRequest`](crate::download::DownloadRequest)
//! or a [`SkippedRow`]. Malformed rows never abort the sequence; only an
//! unreadable file or a missing column does.
//!
//! # Example
//!
//! ```no_run
//! use linkprint_core::parser::{RecordOptions, RecordSource};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = RecordSource::open("links.csv", RecordOptions::default())?;
//! let batch = source.collect()?;
//! println!("{} requests, {} skipped", batch.len(), batch.skipped_count());
//! # Ok(())
//! # }
//! ```

mod error;
mod rows;

pub use error::ParseError;
pub use rows::{
    ColumnNames, DEFAULT_LINK_COLUMN, DEFAULT_NAME_COLUMN, RecordBatch, RecordOptions,
    RecordSource, RowOutcome, Rows, SkipReason, SkippedRow, print_view_link, sanitize_name,
};
