//! Browser rendering collaborator.
//!
//! The worker pool talks to a headless browser through two traits:
//! [`RenderBackend`] hands out isolated [`RenderContext`]s (separate cookie
//! jars and storage), and each context can load a page, wait for the network
//! to settle and print it to PDF. [`ChromiumBackend`] drives a real
//! Chromium over the DevTools protocol; tests substitute a scripted backend.

mod chromium;
mod quiescence;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::CookieRecord;

pub use chromium::{ChromiumBackend, LaunchOptions};
pub use quiescence::{InflightTracker, wait_until_quiet};

/// Default quiet period required before a page counts as loaded.
pub const DEFAULT_IDLE_WINDOW: Duration = Duration::from_millis(500);

/// Default number of in-flight requests tolerated during the quiet period.
pub const DEFAULT_MAX_INFLIGHT: usize = 2;

/// Default navigation timeout in seconds.
pub const DEFAULT_NAVIGATION_TIMEOUT_SECS: u64 = 30;

/// Errors reported by a rendering backend.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// The browser process could not be started.
    #[error("failed to launch browser: {message}\n  Suggestion: set CHROME_PATH or pass --browser to point at a Chromium binary")]
    Launch {
        /// Launch failure detail.
        message: String,
    },

    /// An isolated context could not be created, reset or closed.
    #[error("browser context error: {message}")]
    Context {
        /// Failure detail.
        message: String,
    },

    /// Cookies were rejected by the browser.
    #[error("cookie injection failed: {message}")]
    Cookies {
        /// Failure detail.
        message: String,
    },

    /// The page failed to load.
    #[error("navigation to {url} failed: {message}")]
    Navigation {
        /// Requested URL.
        url: String,
        /// Failure detail (e.g. `net::ERR_NAME_NOT_RESOLVED`).
        message: String,
    },

    /// The loaded page could not be printed.
    #[error("PDF rendering failed: {message}")]
    Render {
        /// Failure detail.
        message: String,
    },

    /// The browser connection is gone.
    #[error("browser connection closed")]
    Closed,
}

impl BrowserError {
    /// Creates a launch error.
    pub fn launch(message: impl Into<String>) -> Self {
        Self::Launch {
            message: message.into(),
        }
    }

    /// Creates a context error.
    pub fn context(message: impl Into<String>) -> Self {
        Self::Context {
            message: message.into(),
        }
    }

    /// Creates a cookie injection error.
    pub fn cookies(message: impl Into<String>) -> Self {
        Self::Cookies {
            message: message.into(),
        }
    }

    /// Creates a navigation error.
    pub fn navigation(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a rendering error.
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render {
            message: message.into(),
        }
    }
}

/// When a navigation counts as finished.
///
/// A page is loaded once no more than `max_inflight` requests have been
/// outstanding for a continuous `idle_window`. The whole navigation,
/// including the wait, is bounded by `timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuiescencePolicy {
    /// Upper bound on the whole navigation.
    pub timeout: Duration,
    /// Required quiet period.
    pub idle_window: Duration,
    /// In-flight requests tolerated during the quiet period.
    pub max_inflight: usize,
}

impl Default for QuiescencePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_NAVIGATION_TIMEOUT_SECS),
            idle_window: DEFAULT_IDLE_WINDOW,
            max_inflight: DEFAULT_MAX_INFLIGHT,
        }
    }
}

impl QuiescencePolicy {
    /// Default policy with a different navigation timeout.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

/// Source of isolated rendering contexts.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    /// Opens a new context with an empty cookie jar and storage.
    async fn open_context(&self) -> Result<Box<dyn RenderContext>, BrowserError>;

    /// Shuts the backend down. Contexts still open become unusable.
    async fn shutdown(&self) -> Result<(), BrowserError>;
}

/// One isolated browsing context holding a single page.
#[async_trait]
pub trait RenderContext: Send {
    /// Adds cookies to this context's jar.
    async fn inject_cookies(&mut self, cookies: &[CookieRecord]) -> Result<(), BrowserError>;

    /// Loads `url` and waits for network quiescence.
    async fn navigate(&mut self, url: &str, policy: &QuiescencePolicy)
    -> Result<(), BrowserError>;

    /// Prints the current page as an A4 PDF.
    async fn render_pdf(&mut self) -> Result<Vec<u8>, BrowserError>;

    /// Returns the context to the state of a freshly opened one: cookies,
    /// site storage of the last visited origin and navigation history are
    /// cleared and a blank page is loaded.
    async fn reset(&mut self) -> Result<(), BrowserError>;

    /// Releases the context.
    async fn close(&mut self) -> Result<(), BrowserError>;
}
