//! Browser context checkout according to the pool's [`ContextPolicy`].

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::auth::CookieRecord;
use crate::browser::{RenderBackend, RenderContext};
use crate::download::TaskError;

/// How browser contexts are assigned to tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContextPolicy {
    /// Every task gets a brand-new context that is closed afterwards.
    #[default]
    Fresh,
    /// Contexts are reset and handed to later tasks; a context whose task
    /// failed is discarded.
    Reuse,
}

impl ContextPolicy {
    /// Lower-case name used in configuration.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Reuse => "reuse",
        }
    }
}

impl fmt::Display for ContextPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fresh" => Ok(Self::Fresh),
            "reuse" => Ok(Self::Reuse),
            other => Err(format!(
                "unknown context policy '{other}' (expected 'fresh' or 'reuse')"
            )),
        }
    }
}

/// Idle contexts kept for reuse.
pub(super) struct ContextPool {
    policy: ContextPolicy,
    idle: Mutex<Vec<Box<dyn RenderContext>>>,
}

impl ContextPool {
    pub(super) fn new(policy: ContextPolicy) -> Self {
        Self {
            policy,
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Hands out a context with an empty jar plus `cookies`.
    pub(super) async fn checkout(
        &self,
        backend: &dyn RenderBackend,
        cookies: &[CookieRecord],
    ) -> Result<Box<dyn RenderContext>, TaskError> {
        let mut context = match self.take_idle().await {
            Some(context) => context,
            None => backend.open_context().await.map_err(TaskError::context)?,
        };

        if let Err(source) = context.inject_cookies(cookies).await {
            close_quietly(context.as_mut()).await;
            return Err(TaskError::cookie_injection(source));
        }
        Ok(context)
    }

    /// Returns a context after use. Only healthy contexts are kept, and only
    /// under [`ContextPolicy::Reuse`].
    pub(super) async fn checkin(&self, mut context: Box<dyn RenderContext>, healthy: bool) {
        if self.policy == ContextPolicy::Reuse && healthy {
            if let Ok(mut idle) = self.idle.lock() {
                idle.push(context);
                return;
            }
        }
        close_quietly(context.as_mut()).await;
    }

    /// Closes every idle context.
    pub(super) async fn close_all(&self) {
        let idle = match self.idle.lock() {
            Ok(mut idle) => std::mem::take(&mut *idle),
            Err(_) => Vec::new(),
        };
        debug!(count = idle.len(), "closing idle browser contexts");
        for mut context in idle {
            close_quietly(context.as_mut()).await;
        }
    }

    /// Pops an idle context and resets it; contexts that fail to reset are dropped.
    async fn take_idle(&self) -> Option<Box<dyn RenderContext>> {
        loop {
            let candidate = self.idle.lock().ok()?.pop();
            let mut context = candidate?;
            match context.reset().await {
                Ok(()) => return Some(context),
                Err(error) => {
                    warn!(%error, "discarding browser context that failed to reset");
                    close_quietly(context.as_mut()).await;
                }
            }
        }
    }
}

async fn close_quietly(context: &mut dyn RenderContext) {
    if let Err(error) = context.close().await {
        debug!(%error, "browser context close failed");
    }
}
