//! Scripted in-memory render backend for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use linkprint_core::auth::CookieRecord;
use linkprint_core::browser::{BrowserError, QuiescencePolicy, RenderBackend, RenderContext};

/// Behaviour of the fake backend, keyed by URL.
#[derive(Debug, Default, Clone)]
pub struct Script {
    /// Time every navigation takes.
    pub delay: Duration,
    /// URLs whose navigation fails with the given message.
    pub fail_navigation: HashMap<String, String>,
    /// URLs whose navigation never completes.
    pub hang: HashSet<String>,
    /// URLs whose PDF rendering fails.
    pub fail_render: HashSet<String>,
    /// URLs whose PDF rendering panics.
    pub panic_render: HashSet<String>,
    /// Reject every context open.
    pub fail_open: bool,
    /// Reject cookie injection.
    pub fail_cookies: bool,
    /// File whose existence is noted each time a context closes.
    pub watch_on_close: Option<PathBuf>,
}

impl Script {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn fail(mut self, url: &str, message: &str) -> Self {
        self.fail_navigation
            .insert(url.to_string(), message.to_string());
        self
    }

    pub fn hang(mut self, url: &str) -> Self {
        self.hang.insert(url.to_string());
        self
    }

    pub fn fail_render(mut self, url: &str) -> Self {
        self.fail_render.insert(url.to_string());
        self
    }

    pub fn panic_render(mut self, url: &str) -> Self {
        self.panic_render.insert(url.to_string());
        self
    }
}

/// Observable counters shared by the backend and its contexts.
#[derive(Debug, Default)]
pub struct FakeState {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub resets: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub active: AtomicUsize,
    pub peak_active: AtomicUsize,
    pub navigations: Mutex<Vec<String>>,
    pub watched_present_on_close: Mutex<Vec<bool>>,
}

impl FakeState {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn watched_present_on_close(&self) -> Vec<bool> {
        self.watched_present_on_close.lock().unwrap().clone()
    }
}

/// Render backend that produces `PDF <url> cookies=<n>` documents.
pub struct FakeBackend {
    script: Arc<Script>,
    pub state: Arc<FakeState>,
}

impl FakeBackend {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Arc::new(script),
            state: Arc::new(FakeState::default()),
        })
    }
}

#[async_trait]
impl RenderBackend for FakeBackend {
    async fn open_context(&self) -> Result<Box<dyn RenderContext>, BrowserError> {
        if self.script.fail_open {
            return Err(BrowserError::context("scripted open failure"));
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            script: Arc::clone(&self.script),
            state: Arc::clone(&self.state),
            jar: Vec::new(),
            current: None,
            closed: false,
        }))
    }

    async fn shutdown(&self) -> Result<(), BrowserError> {
        self.state.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeContext {
    script: Arc<Script>,
    state: Arc<FakeState>,
    jar: Vec<String>,
    current: Option<String>,
    closed: bool,
}

/// Decrements the active count on drop so timeouts and panics are counted.
struct ActiveGuard(Arc<FakeState>);

impl ActiveGuard {
    fn enter(state: &Arc<FakeState>) -> Self {
        let now = state.active.fetch_add(1, Ordering::SeqCst) + 1;
        state.peak_active.fetch_max(now, Ordering::SeqCst);
        Self(Arc::clone(state))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RenderContext for FakeContext {
    async fn inject_cookies(&mut self, cookies: &[CookieRecord]) -> Result<(), BrowserError> {
        if self.script.fail_cookies {
            return Err(BrowserError::cookies("scripted cookie failure"));
        }
        self.jar
            .extend(cookies.iter().map(|cookie| cookie.name.clone()));
        Ok(())
    }

    async fn navigate(
        &mut self,
        url: &str,
        _policy: &QuiescencePolicy,
    ) -> Result<(), BrowserError> {
        let _active = ActiveGuard::enter(&self.state);
        self.state.navigations.lock().unwrap().push(url.to_string());
        if self.script.hang.contains(url) {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.script.delay).await;
        if let Some(message) = self.script.fail_navigation.get(url) {
            return Err(BrowserError::navigation(url, message.clone()));
        }
        self.current = Some(url.to_string());
        Ok(())
    }

    async fn render_pdf(&mut self) -> Result<Vec<u8>, BrowserError> {
        let url = self.current.clone().unwrap_or_default();
        if self.script.panic_render.contains(&url) {
            panic!("scripted render panic for {url}");
        }
        if self.script.fail_render.contains(&url) {
            return Err(BrowserError::render("scripted render failure"));
        }
        Ok(format!("PDF {url} cookies={}", self.jar.len()).into_bytes())
    }

    async fn reset(&mut self) -> Result<(), BrowserError> {
        self.state.resets.fetch_add(1, Ordering::SeqCst);
        self.jar.clear();
        self.current = None;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if !self.closed {
            self.closed = true;
            self.state.closed.fetch_add(1, Ordering::SeqCst);
            if let Some(path) = &self.script.watch_on_close {
                self.state
                    .watched_present_on_close
                    .lock()
                    .unwrap()
                    .push(path.exists());
            }
        }
        Ok(())
    }
}

/// Two cookies, as a normalized cookie file would produce.
pub fn sample_cookies() -> Arc<[CookieRecord]> {
    let mut session = CookieRecord::new("session", "s3cr3t");
    session.domain = Some(".example.com".to_string());
    let csrf = CookieRecord::new("csrf", "token");
    Arc::from(vec![session, csrf])
}

/// Writes a CSV file with the default headers and the given rows.
pub fn write_input_csv(dir: &Path, rows: &[(&str, &str)]) -> std::path::PathBuf {
    let path = dir.join("input.csv");
    let mut writer = csv::Writer::from_path(&path).unwrap();
    writer.write_record(["Hyperlink", "PDF Name"]).unwrap();
    for (link, name) in rows {
        writer.write_record([*link, *name]).unwrap();
    }
    writer.flush().unwrap();
    path
}

/// Quiescence policy with a short timeout for tests.
pub fn fast_policy(timeout: Duration) -> QuiescencePolicy {
    QuiescencePolicy::with_timeout(timeout)
}
