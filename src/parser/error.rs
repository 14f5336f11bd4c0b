//! Error types for tabular input parsing.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that make the input file unusable.
///
/// Malformed rows are not errors; they are reported as
/// [`super::SkipReason`] values and the sequence continues.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The input file could not be opened or read.
    #[error("cannot read input file {path}: {source}")]
    Io {
        /// The input file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The CSV structure itself is broken (bad quoting, invalid UTF-8, ...).
    #[error("malformed input file {path}: {source}")]
    Csv {
        /// The input file path.
        path: PathBuf,
        /// Underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// A required column is not present in the header row.
    #[error(
        "input file {path} has no '{column}' column (found: {found})\n  Suggestion: pass --link-column/--name-column to match the header"
    )]
    MissingColumn {
        /// The input file path.
        path: PathBuf,
        /// The configured column name that was not found.
        column: String,
        /// Header names that were found, comma separated.
        found: String,
    },
}
