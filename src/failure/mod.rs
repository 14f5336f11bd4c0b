//! Append-only failure ledger.
//!
//! Every failed task appends one CSV record `url,filename,reason` to the
//! ledger file. Fields are CSV-escaped so commas, quotes and newlines inside
//! a reason cannot break the line structure. Records from concurrent tasks
//! never interleave: each record is encoded up front and written with a
//! single `write_all` while holding the ledger lock.
//!
//! The ledger is never truncated; successive runs append to the same file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, error, instrument};

/// Default ledger location, relative to the working directory.
pub const DEFAULT_LEDGER_PATH: &str = "data/failed_downloads.csv";

/// Errors raised by ledger I/O.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger file or its parent directory could not be written.
    #[error("cannot write failure ledger {path}: {source}")]
    Io {
        /// Ledger path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A record could not be encoded or decoded.
    #[error("malformed failure ledger {path}: {source}")]
    Csv {
        /// Ledger path.
        path: PathBuf,
        /// Underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// The ledger lock was poisoned by a panicking writer.
    #[error("failure ledger lock poisoned")]
    Poisoned,
}

/// One decoded ledger record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// The requested URL.
    pub url: String,
    /// The intended output filename.
    pub filename: String,
    /// Human-readable failure reason.
    pub reason: String,
}

/// Shared, append-only writer for failure records.
#[derive(Debug)]
pub struct FailureLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FailureLedger {
    /// Creates a ledger writing to `path`. Nothing is touched until the first record.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// The ledger file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a record from async code. The file I/O runs on the blocking
    /// pool; failures are logged as for [`Self::record`].
    pub async fn append(self: Arc<Self>, url: &str, filename: &str, reason: &str) {
        let (url, filename, reason) = (url.to_string(), filename.to_string(), reason.to_string());
        let ledger = Arc::clone(&self);
        if let Err(err) =
            tokio::task::spawn_blocking(move || ledger.record(&url, &filename, &reason)).await
        {
            error!(ledger = %self.path.display(), error = %err, "Failure ledger writer task failed");
        }
    }

    /// Appends a record, logging instead of failing if the write fails.
    pub fn record(&self, url: &str, filename: &str, reason: &str) {
        if let Err(err) = self.try_record(url, filename, reason) {
            error!(url, filename, error = %err, "Failed to append failure ledger record");
        }
    }

    /// Appends a record, creating the file and its parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if encoding or writing fails.
    #[instrument(level = "debug", skip(self, reason), fields(ledger = %self.path.display()))]
    pub fn try_record(&self, url: &str, filename: &str, reason: &str) -> Result<(), LedgerError> {
        let line = encode_record(url, filename, reason).map_err(|source| LedgerError::Csv {
            path: self.path.clone(),
            source,
        })?;

        let _guard = self.lock.lock().map_err(|_| LedgerError::Poisoned)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| self.io(source))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io(source))?;
        file.write_all(&line).map_err(|source| self.io(source))?;

        debug!("appended failure record");
        Ok(())
    }

    fn io(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn encode_record(url: &str, filename: &str, reason: &str) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record([url, filename, reason])?;
    writer
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))
}

/// Reads every record of a ledger file.
///
/// A missing file yields an empty list.
///
/// # Errors
///
/// Returns [`LedgerError`] if the file exists but cannot be read or decoded.
pub fn read_entries(path: &Path) -> Result<Vec<LedgerEntry>, LedgerError> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(LedgerError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);
    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| LedgerError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let field = |index: usize| record.get(index).unwrap_or_default().to_string();
        entries.push(LedgerEntry {
            url: field(0),
            filename: field(1),
            reason: field(2),
        });
    }
    Ok(entries)
}
