//! Error types for rendering tasks.
//!
//! Every variant's message is what lands in the failure ledger, so messages
//! describe the failure without repeating the URL or filename (the ledger
//! already has columns for those).

use std::time::Duration;

use thiserror::Error;

use crate::browser::BrowserError;
use crate::output::OutputError;

/// Why a single rendering task failed.
#[derive(Debug, Error)]
pub enum TaskError {
    /// No browser context could be obtained.
    #[error("could not open browser context: {source}")]
    Context {
        /// Backend error.
        #[source]
        source: BrowserError,
    },

    /// Session cookies were rejected.
    #[error("{source}")]
    CookieInjection {
        /// Backend error.
        #[source]
        source: BrowserError,
    },

    /// The page failed to load (DNS, TLS, connection refused, ...).
    #[error("{source}")]
    Navigation {
        /// Backend error.
        #[source]
        source: BrowserError,
    },

    /// The page did not settle within the navigation timeout.
    #[error("navigation timeout of {}ms exceeded", timeout.as_millis())]
    Timeout {
        /// The configured timeout.
        timeout: Duration,
    },

    /// The page loaded but could not be printed.
    #[error("{source}")]
    Render {
        /// Backend error.
        #[source]
        source: BrowserError,
    },

    /// The PDF could not be written.
    #[error("{source}")]
    Write {
        /// Output error.
        #[source]
        source: OutputError,
    },

    /// The task panicked.
    #[error("task panicked: {message}")]
    Panicked {
        /// Panic payload, when it was a string.
        message: String,
    },

    /// The pool shut down before the task could run.
    #[error("task cancelled before completion")]
    Cancelled,
}

impl TaskError {
    /// Creates a context error.
    pub fn context(source: BrowserError) -> Self {
        Self::Context { source }
    }

    /// Creates a cookie injection error.
    pub fn cookie_injection(source: BrowserError) -> Self {
        Self::CookieInjection { source }
    }

    /// Creates a navigation error.
    pub fn navigation(source: BrowserError) -> Self {
        Self::Navigation { source }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout }
    }

    /// Creates a rendering error.
    pub fn render(source: BrowserError) -> Self {
        Self::Render { source }
    }

    /// Creates a write error.
    pub fn write(source: OutputError) -> Self {
        Self::Write { source }
    }

    /// Creates a panic error.
    pub fn panicked(message: impl Into<String>) -> Self {
        Self::Panicked {
            message: message.into(),
        }
    }

    /// Short, stable label used in structured logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Context { .. } => "context",
            Self::CookieInjection { .. } => "cookies",
            Self::Navigation { .. } => "navigation",
            Self::Timeout { .. } => "timeout",
            Self::Render { .. } => "render",
            Self::Write { .. } => "io",
            Self::Panicked { .. } => "panic",
            Self::Cancelled => "cancelled",
        }
    }
}
