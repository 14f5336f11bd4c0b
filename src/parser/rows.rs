//! Row-oriented record source over a CSV export of the spreadsheet.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use tracing::{debug, info, instrument, warn};

use super::ParseError;
use crate::download::{DownloadRequest, RequestError};

/// Default header of the hyperlink column.
pub const DEFAULT_LINK_COLUMN: &str = "Hyperlink";

/// Default header of the display-name column.
pub const DEFAULT_NAME_COLUMN: &str = "PDF Name";

/// Characters replaced by `_` when name sanitizing is enabled.
const UNSAFE_NAME_CHARS: [char; 9] = ['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Path segment of an editor link, and its print-view replacement.
const EDIT_SEGMENT: &str = "/edit/";
const PRINT_SEGMENT: &str = "/print/";

/// Status cell values that select a row (compared case-insensitively).
const TRUTHY_STATUS: [&str; 5] = ["true", "yes", "1", "x", "checked"];

/// Header names of the columns the source reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNames {
    /// Column holding the page URL.
    pub link: String,
    /// Column holding the display name used for the filename.
    pub name: String,
    /// Optional column whose truthy cells select a row.
    pub status: Option<String>,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            link: DEFAULT_LINK_COLUMN.to_string(),
            name: DEFAULT_NAME_COLUMN.to_string(),
            status: None,
        }
    }
}

/// Options controlling how rows become requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordOptions {
    /// Header names to read.
    pub columns: ColumnNames,
    /// Replace path-unsafe characters in names with `_`.
    pub sanitize_names: bool,
    /// Rewrite `/edit/` to `/print/` in hyperlinks so the print view is rendered.
    pub print_view_links: bool,
}

/// Why a row did not produce a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The hyperlink is empty or not http-prefixed.
    InvalidHyperlink {
        /// The trimmed hyperlink cell.
        value: String,
    },
    /// The name is empty or `nan`.
    InvalidName {
        /// The trimmed name cell.
        value: String,
    },
    /// The status column is configured and this row's cell is not truthy.
    NotSelected {
        /// The trimmed status cell.
        status: String,
    },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHyperlink { value } => write!(f, "invalid hyperlink '{value}'"),
            Self::InvalidName { value } => write!(f, "invalid name '{value}'"),
            Self::NotSelected { status } => write!(f, "not selected (status '{status}')"),
        }
    }
}

/// A row that was skipped, with its 1-based data row number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    /// 1-based data row number (header excluded).
    pub row_index: usize,
    /// Why the row was skipped.
    pub reason: SkipReason,
}

/// Classification of a single data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// The row is valid.
    Request(DownloadRequest),
    /// The row was rejected.
    Skipped(SkippedRow),
}

/// Every row of a source, split into requests and skips.
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    /// Valid requests in file order.
    pub requests: Vec<DownloadRequest>,
    /// Skipped rows in file order.
    pub skipped: Vec<SkippedRow>,
}

impl RecordBatch {
    /// Number of valid requests.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns true when no row produced a request.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Number of skipped rows.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Number of data rows read.
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.requests.len() + self.skipped.len()
    }
}

#[derive(Debug, Clone, Copy)]
struct ColumnIndices {
    link: usize,
    name: usize,
    status: Option<usize>,
}

/// Lazy, restartable source of [`DownloadRequest`]s read from a CSV file.
///
/// The file is only ever opened for reading. Each call to [`Self::rows`]
/// re-opens it and starts again from the first data row.
#[derive(Debug, Clone)]
pub struct RecordSource {
    path: PathBuf,
    options: RecordOptions,
}

impl RecordSource {
    /// Opens a source and checks that the configured columns exist.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Io`] if the file cannot be opened,
    /// [`ParseError::Csv`] if the header row is unreadable, and
    /// [`ParseError::MissingColumn`] if a configured column is absent.
    #[instrument(level = "debug", skip(options), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, options: RecordOptions) -> Result<Self, ParseError> {
        let source = Self {
            path: path.as_ref().to_path_buf(),
            options,
        };
        let mut reader = source.reader()?;
        let indices = source.column_indices(&mut reader)?;
        debug!(?indices, "resolved input columns");
        Ok(source)
    }

    /// The input file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The options this source was opened with.
    #[must_use]
    pub fn options(&self) -> &RecordOptions {
        &self.options
    }

    /// Starts a fresh pass over the data rows.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::open`] if the file changed or
    /// disappeared since it was opened.
    pub fn rows(&self) -> Result<Rows, ParseError> {
        let mut reader = self.reader()?;
        let indices = self.column_indices(&mut reader)?;
        Ok(Rows {
            records: reader.into_records(),
            path: self.path.clone(),
            indices,
            sanitize_names: self.options.sanitize_names,
            print_view_links: self.options.print_view_links,
            row_index: 0,
        })
    }

    /// Reads every row into a [`RecordBatch`].
    ///
    /// # Errors
    ///
    /// Returns the first [`ParseError`] encountered; skipped rows are not errors.
    pub fn collect(&self) -> Result<RecordBatch, ParseError> {
        let mut batch = RecordBatch::default();
        for outcome in self.rows()? {
            match outcome? {
                RowOutcome::Request(request) => batch.requests.push(request),
                RowOutcome::Skipped(skipped) => batch.skipped.push(skipped),
            }
        }
        info!(
            path = %self.path.display(),
            rows = batch.total_rows(),
            requests = batch.len(),
            skipped = batch.skipped_count(),
            "Read input rows"
        );
        Ok(batch)
    }

    fn reader(&self) -> Result<csv::Reader<File>, ParseError> {
        let file = File::open(&self.path).map_err(|source| ParseError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file))
    }

    fn column_indices(&self, reader: &mut csv::Reader<File>) -> Result<ColumnIndices, ParseError> {
        let headers = reader
            .headers()
            .map_err(|source| ParseError::Csv {
                path: self.path.clone(),
                source,
            })?
            .clone();
        let columns = &self.options.columns;
        Ok(ColumnIndices {
            link: self.find_column(&headers, &columns.link)?,
            name: self.find_column(&headers, &columns.name)?,
            status: columns
                .status
                .as_deref()
                .map(|status| self.find_column(&headers, status))
                .transpose()?,
        })
    }

    fn find_column(&self, headers: &StringRecord, wanted: &str) -> Result<usize, ParseError> {
        let wanted = wanted.trim();
        headers
            .iter()
            .position(|header| normalize_header(header) == wanted)
            .ok_or_else(|| ParseError::MissingColumn {
                path: self.path.clone(),
                column: wanted.to_string(),
                found: headers
                    .iter()
                    .map(normalize_header)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// Iterator over the classified data rows of one pass.
pub struct Rows {
    records: csv::StringRecordsIntoIter<File>,
    path: PathBuf,
    indices: ColumnIndices,
    sanitize_names: bool,
    print_view_links: bool,
    row_index: usize,
}

impl Iterator for Rows {
    type Item = Result<RowOutcome, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(source) => {
                return Some(Err(ParseError::Csv {
                    path: self.path.clone(),
                    source,
                }));
            }
        };
        self.row_index += 1;

        let outcome = classify_row(
            &record,
            self.row_index,
            self.indices,
            self.sanitize_names,
            self.print_view_links,
        );
        if let RowOutcome::Skipped(skipped) = &outcome {
            warn!(row = skipped.row_index, reason = %skipped.reason, "Skipping row");
        }
        Some(Ok(outcome))
    }
}

fn classify_row(
    record: &StringRecord,
    row_index: usize,
    indices: ColumnIndices,
    sanitize_names: bool,
    print_view_links: bool,
) -> RowOutcome {
    let cell = |index: usize| record.get(index).unwrap_or("");

    if let Some(status_index) = indices.status {
        let status = cell(status_index).trim();
        if !is_truthy(status) {
            return RowOutcome::Skipped(SkippedRow {
                row_index,
                reason: SkipReason::NotSelected {
                    status: status.to_string(),
                },
            });
        }
    }

    let name = if sanitize_names {
        sanitize_name(cell(indices.name))
    } else {
        cell(indices.name).to_string()
    };

    let link = cell(indices.link).trim();
    let link = if print_view_links {
        print_view_link(link)
    } else {
        link.to_string()
    };

    match DownloadRequest::new(&link, &name, row_index) {
        Ok(request) => RowOutcome::Request(request),
        Err(RequestError::InvalidUrl { url }) => RowOutcome::Skipped(SkippedRow {
            row_index,
            reason: SkipReason::InvalidHyperlink { value: url },
        }),
        Err(RequestError::InvalidName { name }) => RowOutcome::Skipped(SkippedRow {
            row_index,
            reason: SkipReason::InvalidName { value: name },
        }),
    }
}

fn normalize_header(header: &str) -> &str {
    header.trim_start_matches('\u{feff}').trim()
}

fn is_truthy(status: &str) -> bool {
    TRUTHY_STATUS
        .iter()
        .any(|truthy| status.eq_ignore_ascii_case(truthy))
}

/// Points an editor link at its print view by replacing every `/edit/`
/// segment with `/print/`.
#[must_use]
pub fn print_view_link(link: &str) -> String {
    link.replace(EDIT_SEGMENT, PRINT_SEGMENT)
}

/// Replaces path-unsafe characters in a display name with `_`.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if UNSAFE_NAME_CHARS.contains(&ch) { '_' } else { ch })
        .collect()
}
