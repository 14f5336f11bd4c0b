//! Download request and task result types shared by the parser and the pool.

use std::fmt;

use thiserror::Error;

/// Literal suffix appended to every derived filename.
pub const PDF_SUFFIX: &str = ".pdf";

/// Reasons a candidate request violates its invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The hyperlink is empty or does not start with `http`.
    #[error("hyperlink '{url}' does not start with http")]
    InvalidUrl {
        /// The offending (trimmed) hyperlink.
        url: String,
    },

    /// The name is empty or the literal `nan`.
    #[error("name '{name}' is empty or nan")]
    InvalidName {
        /// The offending (trimmed) name.
        name: String,
    },
}

/// One page to render and save.
///
/// Immutable once built; fields are read through accessors so the
/// invariants checked in [`DownloadRequest::new`] cannot be broken later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    url: String,
    filename: String,
    row_index: usize,
}

impl DownloadRequest {
    /// Builds a request from a hyperlink and a display name.
    ///
    /// Both values are trimmed. The filename is the trimmed name with
    /// [`PDF_SUFFIX`] appended once.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidUrl`] when the hyperlink is empty or
    /// lacks the `http` prefix, and [`RequestError::InvalidName`] when the
    /// name is empty or equals `nan` in any case.
    pub fn new(url: &str, name: &str, row_index: usize) -> Result<Self, RequestError> {
        let url = url.trim();
        if url.is_empty() || !url.starts_with("http") {
            return Err(RequestError::InvalidUrl {
                url: url.to_string(),
            });
        }

        let name = name.trim();
        if name.is_empty() || name.eq_ignore_ascii_case("nan") {
            return Err(RequestError::InvalidName {
                name: name.to_string(),
            });
        }

        Ok(Self {
            url: url.to_string(),
            filename: format!("{name}{PDF_SUFFIX}"),
            row_index,
        })
    }

    /// The page URL to navigate to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The target filename inside the output directory.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// 1-based data row number in the input file (0 for synthetic requests).
    #[must_use]
    pub fn row_index(&self) -> usize {
        self.row_index
    }
}

/// Identifier assigned by the pool at enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Terminal outcome of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The PDF was written.
    Success,
    /// The task failed; carries the original error's message.
    Failure {
        /// Human-readable failure reason.
        reason: String,
    },
}

/// Result of exactly one worker execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    /// Pool-assigned identifier.
    pub id: TaskId,
    /// The request that was processed.
    pub request: DownloadRequest,
    /// How the task ended.
    pub outcome: TaskOutcome,
}

impl TaskResult {
    /// Returns true when the task succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Success)
    }

    /// Returns the failure reason, if any.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            TaskOutcome::Success => None,
            TaskOutcome::Failure { reason } => Some(reason),
        }
    }
}
