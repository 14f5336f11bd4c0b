//! Headless Chromium backend over the DevTools protocol.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{BrowserContextId, CloseParams};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, CookieSameSite, EnableParams, EventLoadingFailed, EventLoadingFinished,
    EventRequestWillBeSent, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::{PrintToPdfParams, ResetNavigationHistoryParams};
use chromiumoxide::cdp::browser_protocol::storage::{
    ClearCookiesParams, ClearDataForOriginParams, SetCookiesParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::{BrowserError, QuiescencePolicy, RenderBackend, RenderContext, wait_until_quiet};
use crate::auth::{CookieRecord, SameSite};

/// A4 paper size in inches.
const A4_WIDTH_IN: f64 = 8.27;
const A4_HEIGHT_IN: f64 = 11.69;

const BLANK_PAGE: &str = "about:blank";

/// Storage types cleared for each visited origin on reset.
const ALL_STORAGE_TYPES: &str = "all";

/// Options for starting the browser process.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Browser executable; auto-detected when `None`.
    pub executable: Option<PathBuf>,
}

/// Chromium driven through `chromiumoxide`.
///
/// One browser process serves every context. Each context is a separate
/// Chromium browser context (incognito-like profile) with a single page.
pub struct ChromiumBackend {
    browser: Arc<Browser>,
    handler: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ChromiumBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumBackend").finish_non_exhaustive()
    }
}

impl ChromiumBackend {
    /// Launches a headless browser with the sandbox disabled.
    ///
    /// # Errors
    ///
    /// Returns [`BrowserError::Launch`] if the configuration is invalid or
    /// the process cannot be started.
    #[instrument(skip(options), fields(executable = ?options.executable))]
    pub async fn launch(options: LaunchOptions) -> Result<Self, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-setuid-sandbox");
        if let Some(executable) = options.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(BrowserError::launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(error) = event {
                    warn!(%error, "browser handler error");
                }
            }
            debug!("browser handler finished");
        });

        info!("Launched headless browser");
        Ok(Self {
            browser: Arc::new(browser),
            handler: Mutex::new(Some(handler)),
        })
    }
}

#[async_trait]
impl RenderBackend for ChromiumBackend {
    async fn open_context(&self) -> Result<Box<dyn RenderContext>, BrowserError> {
        let context_id = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| BrowserError::context(e.to_string()))?
            .result
            .browser_context_id;

        let mut target = CreateTargetParams::new(BLANK_PAGE);
        target.browser_context_id = Some(context_id.clone());
        let page = match self.browser.new_page(target).await {
            Ok(page) => page,
            Err(e) => {
                dispose_context(&self.browser, context_id).await;
                return Err(BrowserError::context(e.to_string()));
            }
        };
        if let Err(error) = page.execute(EnableParams::default()).await {
            debug!(%error, "network domain enable failed");
        }

        Ok(Box::new(ChromiumContext {
            browser: Arc::clone(&self.browser),
            context_id,
            page: Some(page),
            visited_origins: Vec::new(),
        }))
    }

    async fn shutdown(&self) -> Result<(), BrowserError> {
        let result = self
            .browser
            .execute(CloseParams::default())
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::context(e.to_string()));

        let handler = self.handler.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handler) = handler {
            handler.abort();
        }
        info!("Browser shut down");
        result
    }
}

struct ChromiumContext {
    browser: Arc<Browser>,
    context_id: BrowserContextId,
    page: Option<Page>,
    /// Origins whose site storage must be cleared on reset.
    visited_origins: Vec<String>,
}

impl ChromiumContext {
    fn page(&self) -> Result<&Page, BrowserError> {
        self.page.as_ref().ok_or(BrowserError::Closed)
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn inject_cookies(&mut self, cookies: &[CookieRecord]) -> Result<(), BrowserError> {
        if cookies.is_empty() {
            return Ok(());
        }
        let params = SetCookiesParams {
            cookies: cookies.iter().map(to_cookie_param).collect(),
            browser_context_id: Some(self.context_id.clone()),
        };
        self.browser
            .execute(params)
            .await
            .map_err(|e| BrowserError::cookies(e.to_string()))?;
        Ok(())
    }

    async fn navigate(
        &mut self,
        url: &str,
        policy: &QuiescencePolicy,
    ) -> Result<(), BrowserError> {
        if let Some(origin) = origin_of(url) {
            remember_origin(&mut self.visited_origins, origin);
        }
        let page = self.page()?;
        let listen_err = |e: chromiumoxide::error::CdpError| BrowserError::navigation(url, e.to_string());
        let started = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(listen_err)?
            .map(|event| event.request_id.inner().clone());
        let finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(listen_err)?
            .map(|event| event.request_id.inner().clone());
        let failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(listen_err)?
            .map(|event| event.request_id.inner().clone());

        page.goto(url)
            .await
            .map_err(|e| BrowserError::navigation(url, e.to_string()))?;

        let inflight =
            wait_until_quiet(policy, started, futures_util::stream::select(finished, failed))
                .await?;
        let landed = page.url().await.ok().flatten().and_then(|current| origin_of(&current));
        debug!(url, inflight, "network quiet");
        if let Some(origin) = landed {
            remember_origin(&mut self.visited_origins, origin);
        }
        Ok(())
    }

    async fn render_pdf(&mut self) -> Result<Vec<u8>, BrowserError> {
        let params = PrintToPdfParams {
            paper_width: Some(A4_WIDTH_IN),
            paper_height: Some(A4_HEIGHT_IN),
            print_background: Some(true),
            ..Default::default()
        };
        self.page()?
            .pdf(params)
            .await
            .map_err(|e| BrowserError::render(e.to_string()))
    }

    async fn reset(&mut self) -> Result<(), BrowserError> {
        let reset_err = |e: chromiumoxide::error::CdpError| BrowserError::context(e.to_string());
        self.browser
            .execute(ClearCookiesParams {
                browser_context_id: Some(self.context_id.clone()),
            })
            .await
            .map_err(reset_err)?;
        for origin in std::mem::take(&mut self.visited_origins) {
            self.page()?
                .execute(ClearDataForOriginParams::new(origin, ALL_STORAGE_TYPES))
                .await
                .map_err(reset_err)?;
        }
        let page = self.page()?;
        page.goto(BLANK_PAGE).await.map_err(reset_err)?;
        page.execute(ResetNavigationHistoryParams::default())
            .await
            .map_err(reset_err)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        let Some(page) = self.page.take() else {
            return Ok(());
        };
        if let Err(error) = page.close().await {
            debug!(%error, "page close failed");
        }
        dispose_context(&self.browser, self.context_id.clone()).await;
        Ok(())
    }
}

async fn dispose_context(browser: &Browser, context_id: BrowserContextId) {
    if let Err(error) = browser
        .execute(DisposeBrowserContextParams::new(context_id))
        .await
    {
        debug!(%error, "browser context dispose failed");
    }
}

/// Serialized origin of `url`, or `None` for opaque origins.
fn origin_of(url: &str) -> Option<String> {
    let origin = url::Url::parse(url).ok()?.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

fn remember_origin(origins: &mut Vec<String>, origin: String) {
    if !origins.contains(&origin) {
        origins.push(origin);
    }
}

fn to_cookie_param(cookie: &CookieRecord) -> CookieParam {
    let mut param = CookieParam::new(cookie.name.clone(), cookie.value().to_string());
    param.url.clone_from(&cookie.url);
    param.domain.clone_from(&cookie.domain);
    param.path.clone_from(&cookie.path);
    param.secure = cookie.secure;
    param.http_only = cookie.http_only;
    param.expires = cookie.expires.map(TimeSinceEpoch::new);
    param.same_site = cookie.same_site.map(|same_site| match same_site {
        SameSite::Strict => CookieSameSite::Strict,
        SameSite::Lax => CookieSameSite::Lax,
        SameSite::None => CookieSameSite::None,
    });
    param
}
