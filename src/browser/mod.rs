//! The browser backend: the same command surface as the HTTP session,
//! driven through a controlled Chrome instance.
//!
//! Every user-visible command wraps its browser operation with an
//! artifact-saving step, so a recorded browser script replays with the same
//! counter lineup as an HTTP one. Replay loads each saved body back into
//! the live browser through a `file://` staging file, which keeps DOM
//! queries (including the extractor's) working against the recorded page.

pub mod download;

pub use download::DownloadOptions;

use crate::artifact::{PageMetadata, ResponseMeta};
use crate::config::Config;
use crate::extract::live::{ExtractLive, LiveDom};
use crate::extract::{ExtractModel, ExtractOptions};
use crate::session::Session;
use crate::timeouts::{ms, secs};
use crate::xpath::escape_xpath_text;
use crate::{Error, Result};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::network::{EventResponseReceived, ResourceType};
use chromiumoxide::{Browser, BrowserConfig, Page as BrowserPage};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

pub(crate) fn cdp(e: impl std::fmt::Display) -> Error {
    Error::Browser(e.to_string())
}

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    /// CDP request timeout applied by the underlying browser channel.
    pub timeout: Option<Duration>,
    /// Deadline applied to each individual browser command.
    pub action_timeout: Option<Duration>,
    pub chrome_path: Option<PathBuf>,
    pub user_data_dir: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            timeout: None,
            action_timeout: None,
            chrome_path: None,
            user_data_dir: None,
            window_width: 1280,
            window_height: 800,
        }
    }
}

impl BrowserOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            headless: config.browser.headless,
            timeout: Some(Duration::from_secs(config.browser.navigation_timeout_secs)),
            action_timeout: config.browser.action_timeout_secs.map(Duration::from_secs),
            chrome_path: config.browser.chrome_path.clone(),
            user_data_dir: config.browser.user_data_dir.clone(),
            window_width: config.browser.window_width,
            window_height: config.browser.window_height,
        }
    }
}

/// A [`Session`] plus a controlled browser. All session behavior remains
/// available through `Deref`.
pub struct BrowserSession {
    session: Session,
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: BrowserPage,
    download_dir: PathBuf,
    action_timeout: Option<Duration>,
    snapshot: tokio::sync::RwLock<Option<String>>,
}

impl std::ops::Deref for BrowserSession {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl Session {
    /// Launches a browser bound to this session's directory layout.
    pub async fn into_browser(self, options: BrowserOptions) -> Result<BrowserSession> {
        BrowserSession::launch(self, options).await
    }
}

struct LaunchedParts {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: BrowserPage,
    download_dir: PathBuf,
}

impl BrowserSession {
    pub async fn launch(session: Session, options: BrowserOptions) -> Result<BrowserSession> {
        let parts = Self::launch_parts(&session, &options).await?;
        Ok(Self::assemble(session, parts, &options))
    }

    /// Launching Chrome is flaky on loaded machines; retry a bounded number
    /// of times before giving up.
    pub async fn launch_with_retry(
        session: Session,
        options: BrowserOptions,
        attempts: u32,
    ) -> Result<BrowserSession> {
        let mut last_err = None;
        for attempt in 1..=attempts.max(1) {
            match Self::launch_parts(&session, &options).await {
                Ok(parts) => return Ok(Self::assemble(session, parts, &options)),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "browser launch failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Browser("browser launch failed".into())))
    }

    fn assemble(session: Session, parts: LaunchedParts, options: &BrowserOptions) -> Self {
        BrowserSession {
            session,
            browser: parts.browser,
            handler_task: parts.handler_task,
            page: parts.page,
            download_dir: parts.download_dir,
            action_timeout: options.action_timeout,
            snapshot: tokio::sync::RwLock::new(None),
        }
    }

    async fn launch_parts(session: &Session, options: &BrowserOptions) -> Result<LaunchedParts> {
        let store = session.store();
        store.ensure_dir()?;
        let download_dir = store.download_dir();
        std::fs::create_dir_all(&download_dir)?;
        let download_dir = download_dir.canonicalize().unwrap_or(download_dir);

        let mut builder =
            BrowserConfig::builder().window_size(options.window_width, options.window_height);
        if !options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &options.chrome_path {
            builder = builder.chrome_executable(path);
        }
        if let Some(dir) = &options.user_data_dir {
            builder = builder.user_data_dir(dir);
        }
        if let Some(timeout) = options.timeout {
            builder = builder.request_timeout(timeout);
        }
        let config = builder.build().map_err(Error::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Error::Browser(format!("launch failed: {e}")))?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let behavior = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(download_dir.display().to_string())
            .events_enabled(true)
            .build()
            .map_err(Error::Browser)?;
        browser.execute(behavior).await.map_err(cdp)?;

        let page = browser.new_page("about:blank").await.map_err(cdp)?;

        Ok(LaunchedParts {
            browser,
            handler_task,
            page,
            download_dir,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Closes the browser. The session state (cookies, counter) survives in
    /// the returned `Session`.
    pub async fn close(mut self) -> Result<Session> {
        self.browser.close().await.ok();
        self.browser.wait().await.ok();
        self.handler_task.abort();
        Ok(self.session)
    }

    // -- shared plumbing --------------------------------------------------

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.action_timeout {
            None => fut.await,
            Some(duration) => match tokio::time::timeout(duration, fut).await {
                Ok(result) => result,
                Err(_) => Err(Error::BrowserTimeout {
                    duration,
                    source: Box::new(Error::Browser("deadline elapsed".into())),
                }),
            },
        }
    }

    /// Best-effort capture of the current HTML for post-mortems. The
    /// browser may not be ready; every failure is swallowed.
    async fn capture_snapshot(&self) {
        let capture = tokio::time::timeout(
            Duration::from_millis(ms::SNAPSHOT_CAPTURE),
            self.page.content(),
        );
        if let Ok(Ok(html)) = capture.await {
            *self.snapshot.write().await = Some(html);
        }
    }

    /// Dumps the last pre-command snapshot to a timestamped file, for
    /// inspecting what the page looked like before a failure.
    pub async fn save_snapshot(&self) -> Result<Option<PathBuf>> {
        let Some(html) = self.snapshot.read().await.clone() else {
            return Ok(None);
        };
        let store = self.session.store();
        store.ensure_dir()?;
        let path = store.snapshot_path(chrono::Local::now());
        std::fs::write(&path, html)?;
        tracing::info!(file = %path.display(), "snapshot saved");
        Ok(Some(path))
    }

    async fn wait_for_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(result) = self.page.evaluate("document.readyState").await
                && result.into_value::<String>().map(|s| s == "complete").unwrap_or(false)
            {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::BrowserTimeout {
                    duration: timeout,
                    source: Box::new(Error::Browser("page never finished loading".into())),
                });
            }
            tokio::time::sleep(Duration::from_millis(ms::POLL_INTERVAL)).await;
        }
    }

    /// Captures the current page into the next artifact slot and mirrors it
    /// into the session's current-page slot.
    async fn save_artifact(&self, response: Option<ResponseMeta>) -> Result<PathBuf> {
        let store = self.session.store();
        store.ensure_dir()?;
        let n = self.session.bump_counter().await;

        let html = self.page.content().await.map_err(cdp)?;
        let url = self
            .page
            .url()
            .await
            .map_err(cdp)?
            .unwrap_or_else(|| "about:blank".to_string());
        let title = self.page.get_title().await.ok().flatten();

        store.write(
            n,
            html.as_bytes(),
            &PageMetadata {
                url: url.clone(),
                content_type: "text/html".to_string(),
                title,
            },
        )?;
        if let Some(meta) = response {
            store.write_response_meta(n, &meta)?;
        }

        if let Ok(parsed) = Url::parse(&url)
            && let Ok(page) = self.session.build_page(html.as_bytes(), "text/html", parsed)
        {
            self.session.set_current_page(Arc::new(page)).await;
        }
        Ok(store.html_path(n))
    }

    /// Replay: consume the next counter slot and load its recorded body
    /// into the live browser via a `file://` staging file.
    async fn load_replay_page(&self) -> Result<PathBuf> {
        let store = self.session.store();
        let n = self.session.bump_counter().await;
        let (raw_body, meta) = store.read(n)?;

        let staged = tempfile::Builder::new()
            .prefix("webreplay-")
            .suffix(".html")
            .tempfile()?;
        std::fs::write(staged.path(), &raw_body)?;
        let file_url = format!("file://{}", staged.path().display());
        self.page.goto(file_url).await.map_err(cdp)?;
        self.wait_for_ready(Duration::from_secs(secs::NAVIGATION))
            .await
            .ok();
        staged.close()?;

        if let Ok(url) = Url::parse(&meta.url)
            && let Ok(page) = self
                .session
                .build_page(&raw_body, &meta.content_type, url)
        {
            self.session.set_current_page(Arc::new(page)).await;
        }
        Ok(store.html_path(n))
    }

    // -- unified command surface ------------------------------------------

    pub async fn do_navigate(&self, url: &str) -> Result<()> {
        if self.session.is_replay().await {
            tracing::debug!(url, "replay: loading recorded page");
            self.load_replay_page().await?;
            return Ok(());
        }

        self.capture_snapshot().await;
        let response = self
            .with_timeout(async {
                let mut responses = match self
                    .page
                    .event_listener::<EventResponseReceived>()
                    .await
                {
                    Ok(stream) => stream.boxed(),
                    Err(_) => futures::stream::pending().boxed(),
                };

                self.page.goto(url).await.map_err(cdp)?;

                // Grab the main document's response for the sidecar.
                let deadline = tokio::time::Instant::now()
                    + Duration::from_millis(ms::RESPONSE_META_WAIT);
                let mut meta = None;
                loop {
                    match tokio::time::timeout_at(deadline, responses.next()).await {
                        Ok(Some(event)) if event.r#type == ResourceType::Document => {
                            meta = Some(ResponseMeta {
                                url: event.response.url.clone(),
                                status: event.response.status,
                                status_text: Some(event.response.status_text.clone()),
                                mime_type: Some(event.response.mime_type.clone()),
                            });
                            break;
                        }
                        Ok(Some(_)) => continue,
                        Ok(None) | Err(_) => break,
                    }
                }
                Ok(meta)
            })
            .await?;

        self.wait_for_ready(Duration::from_secs(secs::NAVIGATION)).await?;
        self.save_artifact(response).await?;
        Ok(())
    }

    pub async fn do_wait_visible(&self, selector: &str) -> Result<()> {
        if self.session.is_replay().await {
            self.load_replay_page().await?;
            // Visibility degenerates to existence against a recorded page.
            return match self.page.find_element(selector).await {
                Ok(_) => Ok(()),
                Err(_) => Err(Error::ElementNotFound {
                    selector: selector.to_string(),
                }),
            };
        }

        self.capture_snapshot().await;
        let timeout = self
            .action_timeout
            .unwrap_or(Duration::from_secs(secs::WAIT_VISIBLE));
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({selector});
                if (!el) return false;
                const style = window.getComputedStyle(el);
                return style.display !== 'none'
                    && style.visibility !== 'hidden'
                    && el.getClientRects().length > 0;
            }})()"#,
            selector = serde_json::to_string(selector)?
        );

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(result) = self.page.evaluate(script.as_str()).await
                && result.into_value::<bool>().unwrap_or(false)
            {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::BrowserTimeout {
                    duration: timeout,
                    source: Box::new(Error::ElementNotFound {
                        selector: selector.to_string(),
                    }),
                });
            }
            tokio::time::sleep(Duration::from_millis(ms::POLL_INTERVAL)).await;
        }
        self.save_artifact(None).await?;
        Ok(())
    }

    pub async fn do_click(&self, selector: &str) -> Result<()> {
        if self.session.is_replay().await {
            self.load_replay_page().await?;
            return Ok(());
        }

        self.capture_snapshot().await;
        self.with_timeout(async {
            let element = self.page.find_element(selector).await.map_err(|_| {
                Error::ElementNotFound {
                    selector: selector.to_string(),
                }
            })?;
            element.click().await.map_err(cdp)?;
            Ok(())
        })
        .await?;

        tokio::time::sleep(Duration::from_millis(ms::PAGE_LOAD_SETTLE)).await;
        self.save_artifact(None).await?;
        Ok(())
    }

    pub async fn do_send_keys(&self, selector: &str, value: &str) -> Result<()> {
        if self.session.is_replay().await {
            self.load_replay_page().await?;
            return Ok(());
        }

        self.capture_snapshot().await;
        self.with_timeout(async {
            let element = self.page.find_element(selector).await.map_err(|_| {
                Error::ElementNotFound {
                    selector: selector.to_string(),
                }
            })?;
            element.click().await.map_err(cdp)?.type_str(value).await.map_err(cdp)?;
            Ok(())
        })
        .await?;
        self.save_artifact(None).await?;
        Ok(())
    }

    pub async fn do_sleep(&self, duration: Duration) -> Result<()> {
        self.session.do_sleep(duration).await
    }

    pub async fn do_save_page(&self) -> Result<PathBuf> {
        if self.session.is_replay().await {
            return self.load_replay_page().await;
        }
        self.save_artifact(None).await
    }

    /// Fills the matching form via the page's own DOM and submits it.
    pub async fn do_submit_form(
        &self,
        selector: &str,
        params: Option<&BTreeMap<String, String>>,
    ) -> Result<()> {
        if self.session.is_replay().await {
            self.load_replay_page().await?;
            return Ok(());
        }

        self.capture_snapshot().await;
        let empty = BTreeMap::new();
        let values = params.unwrap_or(&empty);
        let script = format!(
            r#"(() => {{
                const form = document.querySelector({selector});
                if (!form) return false;
                const values = {values};
                for (const [name, value] of Object.entries(values)) {{
                    if (form.elements[name]) form.elements[name].value = value;
                }}
                form.submit();
                return true;
            }})()"#,
            selector = serde_json::to_string(selector)?,
            values = serde_json::to_string(values)?
        );

        let submitted = self
            .with_timeout(async {
                let result = self.page.evaluate(script.as_str()).await.map_err(cdp)?;
                Ok(result.into_value::<bool>().unwrap_or(false))
            })
            .await?;
        if !submitted {
            return Err(Error::ElementNotFound {
                selector: selector.to_string(),
            });
        }

        self.wait_for_ready(Duration::from_secs(secs::FORM)).await?;
        self.save_artifact(None).await?;
        Ok(())
    }

    /// Finds an anchor by its exact text (or a contained image's alt text)
    /// and clicks it.
    pub async fn follow_anchor(&self, text: &str) -> Result<()> {
        if self.session.is_replay().await {
            self.load_replay_page().await?;
            return Ok(());
        }

        self.capture_snapshot().await;
        let literal = escape_xpath_text(text);
        let xpath = format!("//a[text()={literal} or .//img[@alt={literal}]]");
        let script = format!(
            r#"(() => {{
                const found = document.evaluate({xpath}, document, null,
                    XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
                if (!found) return false;
                found.click();
                return true;
            }})()"#,
            xpath = serde_json::to_string(&xpath)?
        );

        let clicked = self
            .with_timeout(async {
                let result = self.page.evaluate(script.as_str()).await.map_err(cdp)?;
                Ok(result.into_value::<bool>().unwrap_or(false))
            })
            .await?;
        if !clicked {
            return Err(Error::ElementNotFound {
                selector: format!("a with text {text:?}"),
            });
        }

        tokio::time::sleep(Duration::from_millis(ms::PAGE_LOAD_SETTLE)).await;
        self.save_artifact(None).await?;
        Ok(())
    }

    /// Preserves an on-disk file (usually a finished download) into the
    /// next artifact slot, keeping its extension.
    pub async fn save_file(&self, source: &Path) -> Result<PathBuf> {
        let store = self.session.store();
        store.ensure_dir()?;
        let n = self.session.bump_counter().await;
        let extension = source
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or("html");
        let path = store.file_path(n, extension);

        if self.session.is_replay().await {
            if path.exists() {
                return Ok(path);
            }
            return Err(Error::RetryAndRecord { filename: path });
        }

        std::fs::copy(source, &path)?;
        Ok(path)
    }

    pub async fn current_url(&self) -> Result<String> {
        if self.session.is_replay().await {
            return self.session.current_url().await;
        }
        self.page
            .url()
            .await
            .map_err(cdp)?
            .ok_or_else(|| Error::Browser("page has no url".into()))
    }

    pub async fn title(&self) -> Result<Option<String>> {
        if self.session.is_replay().await {
            return Ok(self.session.current_page().await?.title());
        }
        self.page.get_title().await.map_err(cdp)
    }

    /// Extracts a record from the live DOM (the recorded page in replay
    /// mode, since replay loads it into the browser).
    pub async fn extract<T>(&self, selector: &str, opt: &ExtractOptions) -> Result<T>
    where
        T: ExtractLive + ExtractModel,
    {
        if opt.time.is_some() {
            return Err(Error::Extract(
                "`time` is only valid for datetime destinations".into(),
            ));
        }
        let dom = LiveDom::new(&self.page);
        T::extract_live(&dom, selector, vec![String::new()], opt).await
    }
}
