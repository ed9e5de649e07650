//! The HTTP backend: a cookie-jar-backed request/response loop with
//! transparent record/replay.
//!
//! All network I/O funnels through [`Session::invoke`]. In live mode it
//! sends the request, follows redirects, and (with saving on) persists the
//! body and a metadata sidecar under the session directory. In replay mode
//! it reads the same artifacts back in counter order without touching the
//! network, so a recorded script re-runs deterministically offline.

use crate::artifact::{ArtifactStore, PageMetadata};
use crate::config::Config;
use crate::extract::{Extract, ExtractOptions, Selection};
use crate::form::Form;
use crate::page::{BodyFilter, Page, charset_from_content_type, encoding_from_charset};
use crate::{Error, Result};
use encoding_rs::Encoding;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE, REFERER};
use reqwest::{Method, redirect};
use reqwest_cookie_store::CookieStoreMutex;
use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

pub const USER_AGENT_FIREFOX_86: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:86.0) Gecko/20100101 Firefox/86.0";
pub const USER_AGENT_DEFAULT: &str = USER_AGENT_FIREFOX_86;

const ACCEPT_DEFAULT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

static FIELD_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\[name=["']?([^"'\]]+)["']?\]"#).unwrap());

/// Header/form tracing switches, printed through `tracing` when enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceFlags {
    pub request_headers: bool,
    pub response_headers: bool,
    pub form_posting: bool,
}

#[derive(Debug, Clone)]
pub struct FollowAnchorTextOptions {
    /// Also match the text against `img` `alt` attributes inside the anchor.
    pub check_alt: bool,
    /// Required number of matches; 0 accepts any non-zero count.
    pub expected: usize,
    /// Which match to follow.
    pub index: usize,
    /// Trim whitespace on both sides before comparing.
    pub trim_space: bool,
}

impl Default for FollowAnchorTextOptions {
    fn default() -> Self {
        Self {
            check_alt: true,
            expected: 1,
            index: 0,
            trim_space: false,
        }
    }
}

/// A raw response plus enough context to decode it lazily.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub url: Url,
    pub content_type: String,
    pub raw_body: Vec<u8>,
    encoding_override: Option<&'static Encoding>,
}

impl HttpResponse {
    /// Decodes the body with the same resolution order the page model uses.
    pub fn body(&self) -> Result<String> {
        let encoding = self.encoding_override.or_else(|| {
            charset_from_content_type(&self.content_type)
                .and_then(|cs| encoding_from_charset(&cs))
        });
        crate::page::decode(&self.raw_body, encoding)
    }

    /// Enforces a content type at a boundary the caller cares about.
    pub fn expect_content_type(&self, expected: &str) -> Result<()> {
        if self.content_type.starts_with(expected) {
            Ok(())
        } else {
            Err(Error::UnexpectedContentType {
                expected: expected.to_string(),
                actual: self.content_type.clone(),
            })
        }
    }
}

struct SessionState {
    invoke_count: u64,
    save_to_file: bool,
    not_use_network: bool,
    current_page: Option<Arc<Page>>,
    pending_fields: Vec<(String, String)>,
    debug_step: String,
}

/// Long-lived scraping state for the HTTP backend.
pub struct Session {
    name: String,
    file_prefix: String,
    user_agent: String,
    encoding_override: Option<&'static Encoding>,
    trace: TraceFlags,
    client: reqwest::Client,
    cookies: Arc<CookieStoreMutex>,
    body_filter: Option<Arc<BodyFilter>>,
    state: RwLock<SessionState>,
}

impl Session {
    pub fn new(name: impl Into<String>) -> Result<Session> {
        let cookies = Arc::new(CookieStoreMutex::default());
        let client = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .redirect(redirect::Policy::limited(10))
            .build()?;

        Ok(Session {
            name: name.into(),
            file_prefix: String::new(),
            user_agent: USER_AGENT_DEFAULT.to_string(),
            encoding_override: None,
            trace: TraceFlags::default(),
            client,
            cookies,
            body_filter: None,
            state: RwLock::new(SessionState {
                invoke_count: 0,
                save_to_file: false,
                not_use_network: false,
                current_page: None,
                pending_fields: Vec::new(),
                debug_step: String::new(),
            }),
        })
    }

    pub fn from_config(config: &Config) -> Result<Session> {
        let mut session = Session::new(config.session.name.clone())?
            .with_file_prefix(config.session.file_prefix.clone())
            .with_save_to_file(config.session.save_to_file)
            .with_not_use_network(config.session.not_use_network)
            .with_trace(config.trace.flags());
        if let Some(ua) = &config.session.user_agent {
            session = session.with_user_agent(ua.clone());
        }
        if let Some(label) = &config.session.encoding {
            session = session.with_encoding(encoding_from_charset(label));
        }
        Ok(session)
    }

    // -- builder-style configuration --------------------------------------

    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Forces a body encoding, overriding the Content-Type and document
    /// head. Also applied to outgoing form values.
    pub fn with_encoding(mut self, encoding: Option<&'static Encoding>) -> Self {
        self.encoding_override = encoding;
        self
    }

    pub fn with_save_to_file(mut self, on: bool) -> Self {
        self.state.get_mut().save_to_file = on;
        self
    }

    pub fn with_not_use_network(mut self, on: bool) -> Self {
        self.state.get_mut().not_use_network = on;
        self
    }

    pub fn with_trace(mut self, trace: TraceFlags) -> Self {
        self.trace = trace;
        self
    }

    /// Post-decode body hook; the place to turn application-level error
    /// pages into `Login`/`Maintenance` errors.
    pub fn with_body_filter(mut self, filter: Arc<BodyFilter>) -> Self {
        self.body_filter = Some(filter);
        self
    }

    // -- accessors and runtime switches -----------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.file_prefix, &self.name)
    }

    /// Directory all session artifacts live under.
    pub fn session_dir(&self) -> PathBuf {
        self.store().dir().to_path_buf()
    }

    pub(crate) fn encoding_override(&self) -> Option<&'static Encoding> {
        self.encoding_override
    }

    pub async fn is_replay(&self) -> bool {
        self.state.read().await.not_use_network
    }

    pub async fn set_not_use_network(&self, on: bool) {
        self.state.write().await.not_use_network = on;
    }

    pub async fn set_save_to_file(&self, on: bool) {
        self.state.write().await.save_to_file = on;
    }

    pub async fn invoke_count(&self) -> u64 {
        self.state.read().await.invoke_count
    }

    /// Rewinds the invocation counter, typically to 0 before a replay pass.
    pub async fn reset_invoke_count(&self, n: u64) {
        self.state.write().await.invoke_count = n;
    }

    pub(crate) async fn bump_counter(&self) -> u64 {
        let mut state = self.state.write().await;
        state.invoke_count += 1;
        state.invoke_count
    }

    pub async fn set_debug_step(&self, step: impl Into<String>) {
        self.state.write().await.debug_step = step.into();
    }

    pub async fn clear_debug_step(&self) {
        self.state.write().await.debug_step.clear();
    }

    pub async fn debug_step(&self) -> String {
        self.state.read().await.debug_step.clone()
    }

    pub async fn current_page(&self) -> Result<Arc<Page>> {
        self.state
            .read()
            .await
            .current_page
            .clone()
            .ok_or(Error::NoCurrentPage)
    }

    pub(crate) async fn set_current_page(&self, page: Arc<Page>) {
        self.state.write().await.current_page = Some(page);
    }

    pub async fn current_url(&self) -> Result<String> {
        Ok(self.current_page().await?.url().to_string())
    }

    // -- cookies ----------------------------------------------------------

    /// Loads cookies persisted by [`save_cookies`](Self::save_cookies). A
    /// missing file leaves the in-memory jar as is.
    pub fn load_cookies(&self) -> Result<()> {
        let path = self.store().cookie_path();
        if !path.exists() {
            return Ok(());
        }
        let reader = BufReader::new(std::fs::File::open(&path)?);
        let loaded = cookie_store::serde::json::load(reader)
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
        *self.cookies.lock().unwrap() = loaded;
        Ok(())
    }

    /// Persists the jar, session cookies included, to `<dir>/cookie`.
    pub fn save_cookies(&self) -> Result<()> {
        let store = self.store();
        store.ensure_dir()?;
        let mut writer = BufWriter::new(std::fs::File::create(store.cookie_path())?);
        cookie_store::serde::json::save_incl_expired_and_nonpersistent(
            &self.cookies.lock().unwrap(),
            &mut writer,
        )
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
        Ok(())
    }

    // -- the I/O choke point ----------------------------------------------

    pub(crate) async fn invoke(&self, mut req: reqwest::Request) -> Result<HttpResponse> {
        let store = self.store();
        let (n, replay, save) = {
            let mut state = self.state.write().await;
            if state.save_to_file || state.not_use_network {
                store.ensure_dir()?;
            }
            state.invoke_count += 1;
            (state.invoke_count, state.not_use_network, state.save_to_file)
        };

        if self.trace.request_headers {
            tracing::info!(method = %req.method(), url = %req.url(), "request");
        }

        if replay {
            let (raw_body, meta) = store.read(n)?;
            tracing::debug!(file = %store.html_path(n).display(), "loaded recorded page");
            // The recorded URL stands in for the live one so relative links
            // keep resolving.
            let url = Url::parse(&meta.url)?;
            return Ok(HttpResponse {
                url,
                content_type: meta.content_type,
                raw_body,
                encoding_override: self.encoding_override,
            });
        }

        self.set_default_headers(&mut req)?;
        if self.trace.request_headers {
            for (name, value) in req.headers() {
                tracing::info!("  {name}: {value:?}");
            }
        }

        let request_url = req.url().clone();
        let response = self
            .client
            .execute(req)
            .await
            .map_err(|source| Error::Request {
                url: request_url.to_string(),
                source,
            })?;

        let status = response.status();
        let final_url = response.url().clone();
        if !status.is_success() {
            return Err(Error::Response {
                url: final_url.to_string(),
                status,
            });
        }

        if self.trace.response_headers {
            for (name, value) in response.headers() {
                tracing::info!("  {name}: {value:?}");
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let raw_body = response
            .bytes()
            .await
            .map_err(|source| Error::Request {
                url: final_url.to_string(),
                source,
            })?
            .to_vec();

        if save {
            store.write(
                n,
                &raw_body,
                &PageMetadata {
                    url: final_url.to_string(),
                    content_type: content_type.clone(),
                    title: None,
                },
            )?;
        }

        Ok(HttpResponse {
            url: final_url,
            content_type,
            raw_body,
            encoding_override: self.encoding_override,
        })
    }

    fn set_default_headers(&self, req: &mut reqwest::Request) -> Result<()> {
        let defaults: [(HeaderName, &str); 4] = [
            (reqwest::header::USER_AGENT, self.user_agent.as_str()),
            (reqwest::header::ACCEPT, ACCEPT_DEFAULT),
            (HeaderName::from_static("upgrade-insecure-requests"), "1"),
            (HeaderName::from_static("dnt"), "1"),
        ];
        for (name, value) in defaults {
            if !req.headers().contains_key(&name) {
                let value = HeaderValue::from_str(value)
                    .map_err(|e| Error::Config(format!("invalid header value: {e}")))?;
                req.headers_mut().insert(name, value);
            }
        }
        Ok(())
    }

    pub(crate) fn build_page(&self, raw: &[u8], content_type: &str, url: Url) -> Result<Page> {
        let page = Page::build(
            raw,
            content_type,
            url,
            self.encoding_override,
            self.body_filter.as_deref(),
        )?;
        if let Some(title) = page.title() {
            tracing::debug!(%title, "page loaded");
        }
        Ok(page)
    }

    fn page_of(&self, response: &HttpResponse) -> Result<Page> {
        self.build_page(&response.raw_body, &response.content_type, response.url.clone())
    }

    // -- navigation -------------------------------------------------------

    /// Plain GET through the choke point.
    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        let req = reqwest::Request::new(Method::GET, Url::parse(url)?);
        self.invoke(req).await
    }

    /// GET with the current page as `Referer`.
    pub async fn open_url(&self, referer: &Url, url: &str) -> Result<HttpResponse> {
        let mut req = reqwest::Request::new(Method::GET, Url::parse(url)?);
        req.headers_mut().insert(
            REFERER,
            HeaderValue::from_str(referer.as_str())
                .map_err(|e| Error::Config(format!("invalid referer: {e}")))?,
        );
        self.invoke(req).await
    }

    /// GET plus meta-refresh following, bounded by `max_redirect` hops.
    pub async fn get_page_max_redirect(&self, url: &str, max_redirect: usize) -> Result<Arc<Page>> {
        let response = self.get(url).await?;
        let mut page = self.page_of(&response)?;
        for _ in 0..max_redirect {
            let Some(next) = page.meta_refresh() else {
                break;
            };
            tracing::info!(url = %next, "following meta refresh");
            let response = self.get(next.as_str()).await?;
            page = self.page_of(&response)?;
        }
        let page = Arc::new(page);
        self.set_current_page(page.clone()).await;
        Ok(page)
    }

    /// GET following at most one meta-refresh hop.
    pub async fn get_page(&self, url: &str) -> Result<Arc<Page>> {
        self.get_page_max_redirect(url, 1).await
    }

    /// Follows a meta refresh on the current page, if any.
    pub async fn apply_refresh(&self, max_redirect: usize) -> Result<Arc<Page>> {
        let page = self.current_page().await?;
        match page.meta_refresh() {
            Some(next) if max_redirect > 0 => {
                tracing::info!(url = %next, "following meta refresh");
                self.get_page_max_redirect(next.as_str(), max_redirect - 1).await
            }
            _ => Ok(page),
        }
    }

    /// Follows the single element matching `selector` through `attr`.
    pub async fn follow_link(&self, selector: &str, attr: &str) -> Result<Arc<Page>> {
        let page = self.current_page().await?;
        let target = {
            let doc = page.dom();
            let sel = Selection::root(&doc).find(selector)?;
            if sel.len() != 1 {
                return Err(Error::Form(format!(
                    "{} {selector:?}: found {} items",
                    page.url(),
                    sel.len()
                )));
            }
            sel.nodes()[0]
                .value()
                .attr(attr)
                .map(str::to_string)
                .ok_or_else(|| {
                    Error::Form(format!("{} {selector:?}: missing {attr}", page.url()))
                })?
        };
        let url = page.resolve_link(&target)?;
        let response = self.open_url(page.url(), url.as_str()).await?;
        let next = Arc::new(self.page_of(&response)?);
        self.set_current_page(next.clone()).await;
        Ok(next)
    }

    /// Opens the page of a frame's `src`.
    pub async fn frame(&self, selector: &str) -> Result<Arc<Page>> {
        self.follow_link(selector, "src").await
    }

    /// Finds an `<a>` by its exact text (or image alt) and follows it.
    pub async fn follow_anchor_text(&self, text: &str) -> Result<Arc<Page>> {
        self.follow_anchor_text_opt(text, FollowAnchorTextOptions::default())
            .await
    }

    pub async fn follow_anchor_text_opt(
        &self,
        text: &str,
        options: FollowAnchorTextOptions,
    ) -> Result<Arc<Page>> {
        tracing::debug!(text, "searching anchor");
        let wanted = if options.trim_space { text.trim() } else { text };
        let page = self.current_page().await?;

        let href = {
            let doc = page.dom();
            let anchors = Selection::root(&doc).find("a")?;
            let matched: Vec<_> = anchors
                .nodes()
                .iter()
                .filter(|a| {
                    let t: String = a.text().collect();
                    let t = if options.trim_space { t.trim() } else { t.as_str() };
                    if t == wanted {
                        return true;
                    }
                    options.check_alt
                        && Selection::single(**a)
                            .find("img")
                            .map(|imgs| {
                                imgs.nodes()
                                    .iter()
                                    .any(|img| img.value().attr("alt") == Some(wanted))
                            })
                            .unwrap_or(false)
                })
                .copied()
                .collect();

            let found = matched.len();
            if found != options.expected && (found == 0 || options.expected > 0) {
                return Err(Error::Form(format!(
                    "{} {text:?}: found {found} items",
                    page.url()
                )));
            }
            let anchor = matched.get(options.index).ok_or_else(|| {
                Error::Form(format!("{} {text:?}: index {} out of range", page.url(), options.index))
            })?;
            anchor
                .value()
                .attr("href")
                .map(str::to_string)
                .ok_or_else(|| Error::Form(format!("{} {text:?}: missing href", page.url())))?
        };

        let url = page.resolve_link(&href)?;
        let response = self.open_url(page.url(), url.as_str()).await?;
        let next = Arc::new(self.page_of(&response)?);
        self.set_current_page(next.clone()).await;
        Ok(next)
    }

    // -- forms ------------------------------------------------------------

    /// Builds the form matching `formSelector`, sets `params`, and submits.
    pub async fn form_action(
        &self,
        form_selector: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<Arc<Page>> {
        let page = self.current_page().await?;
        let mut form = page.form(form_selector)?;
        for (name, value) in params {
            form.set(name, value)?;
        }
        self.submit(&form).await
    }

    pub async fn submit(&self, form: &Form) -> Result<Arc<Page>> {
        self.submit_with_image(form, None).await
    }

    /// Submits a form. When `image_target` names an `image` input, only that
    /// input contributes click coordinates.
    pub async fn submit_with_image(
        &self,
        form: &Form,
        image_target: Option<&str>,
    ) -> Result<Arc<Page>> {
        let submission = form.submission(image_target, self.encoding_override)?;
        if self.trace.form_posting {
            for (k, v) in &submission.pairs {
                tracing::info!("  {k}={v}");
            }
        }

        let method = Method::from_bytes(submission.method.as_bytes())
            .map_err(|_| Error::Form(format!("invalid form method {:?}", submission.method)))?;
        let mut req = reqwest::Request::new(method, submission.url.clone());
        req.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        req.headers_mut().insert(
            REFERER,
            HeaderValue::from_str(&submission.referer)
                .map_err(|e| Error::Config(format!("invalid referer: {e}")))?,
        );
        *req.body_mut() = Some(submission.body.into_bytes().into());

        let response = self.invoke(req).await?;
        let page = Arc::new(self.page_of(&response)?);
        self.set_current_page(page.clone()).await;
        Ok(page)
    }

    // -- unified command surface ------------------------------------------

    pub async fn do_navigate(&self, url: &str) -> Result<()> {
        self.get_page(url).await.map(|_| ())
    }

    /// Visibility has no meaning without a renderer; the HTTP backend logs
    /// and moves on.
    pub async fn do_wait_visible(&self, selector: &str) -> Result<()> {
        tracing::debug!(selector, "wait_visible is a no-op on the HTTP backend");
        Ok(())
    }

    /// Queues a field value for the next form submission. The selector must
    /// carry a `[name=...]` part.
    pub async fn do_send_keys(&self, selector: &str, value: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(slot) = state
            .pending_fields
            .iter_mut()
            .find(|(s, _)| s == selector)
        {
            slot.1 = value.to_string();
        } else {
            state
                .pending_fields
                .push((selector.to_string(), value.to_string()));
        }
        Ok(())
    }

    /// Clicking an anchor follows it; clicking a submit control submits its
    /// enclosing form with any pending field values applied.
    pub async fn do_click(&self, selector: &str) -> Result<()> {
        enum Target {
            Anchor(String),
            Submit { form: Form, image: Option<String> },
        }

        let page = self.current_page().await?;
        let target = {
            let doc = page.dom();
            let sel = Selection::root(&doc).find(selector)?;
            if sel.len() != 1 {
                return Err(Error::Form(format!(
                    "{} {selector:?}: found {} items",
                    page.url(),
                    sel.len()
                )));
            }
            let element = sel.nodes()[0];
            match element.value().name() {
                "a" => {
                    let href = element.value().attr("href").map(str::to_string).ok_or_else(
                        || Error::Form(format!("{} {selector:?}: missing href", page.url())),
                    )?;
                    Target::Anchor(href)
                }
                "input" | "button" => {
                    let kind = element.value().attr("type").unwrap_or("submit");
                    if !kind.eq_ignore_ascii_case("submit") && !kind.eq_ignore_ascii_case("image") {
                        return Err(Error::Form(format!(
                            "{selector:?} is not a link or submit control"
                        )));
                    }
                    let form_el = element
                        .ancestors()
                        .filter_map(scraper::ElementRef::wrap)
                        .find(|el| el.value().name() == "form")
                        .ok_or_else(|| {
                            Error::Form(format!("{selector:?} has no enclosing form"))
                        })?;
                    let form = Form::from_element(&doc, form_el, page.url(), page.base_url())?;
                    let image = (kind.eq_ignore_ascii_case("image"))
                        .then(|| element.value().attr("name").map(str::to_string))
                        .flatten();
                    Target::Submit { form, image }
                }
                other => {
                    return Err(Error::Form(format!(
                        "{selector:?} is a {other}, not a link or submit control"
                    )));
                }
            }
        };

        match target {
            Target::Anchor(href) => {
                let url = page.resolve_link(&href)?;
                let response = self.open_url(page.url(), url.as_str()).await?;
                let next = Arc::new(self.page_of(&response)?);
                self.set_current_page(next).await;
                Ok(())
            }
            Target::Submit { mut form, image } => {
                let pending = self.take_pending().await;
                apply_pending(&mut form, &pending)?;
                self.submit_with_image(&form, image.as_deref()).await?;
                Ok(())
            }
        }
    }

    /// Resolves the form, applies pending `send_keys` values and `params`,
    /// and submits. The pending map is drained up front, so it is empty
    /// afterwards whether or not submission succeeds.
    pub async fn do_submit_form(
        &self,
        form_selector: &str,
        params: Option<&BTreeMap<String, String>>,
    ) -> Result<Arc<Page>> {
        let pending = self.take_pending().await;
        let page = self.current_page().await?;
        let mut form = page.form(form_selector)?;
        apply_pending(&mut form, &pending)?;
        if let Some(params) = params {
            for (name, value) in params {
                form.set(name, value)?;
            }
        }
        self.submit(&form).await
    }

    pub async fn do_sleep(&self, duration: Duration) -> Result<()> {
        if self.is_replay().await {
            tracing::debug!(?duration, "replay: skipping sleep");
            return Ok(());
        }
        tokio::time::sleep(duration).await;
        Ok(())
    }

    /// Writes the current page into the next artifact slot and returns the
    /// file path. In replay mode the slot is consumed and loaded instead.
    pub async fn do_save_page(&self) -> Result<PathBuf> {
        let store = self.store();
        store.ensure_dir()?;
        let (n, replay) = {
            let mut state = self.state.write().await;
            state.invoke_count += 1;
            (state.invoke_count, state.not_use_network)
        };

        if replay {
            let (raw_body, meta) = store.read(n)?;
            let url = Url::parse(&meta.url)?;
            let page = Arc::new(self.build_page(&raw_body, &meta.content_type, url)?);
            self.set_current_page(page).await;
            return Ok(store.html_path(n));
        }

        let page = self.current_page().await?;
        store.write(
            n,
            page.body().as_bytes(),
            &PageMetadata {
                url: page.url().to_string(),
                content_type: page.content_type().to_string(),
                title: page.title(),
            },
        )?;
        Ok(store.html_path(n))
    }

    /// Extracts a destination from the current page.
    pub async fn extract<T: Extract>(&self, selector: &str, opt: &ExtractOptions) -> Result<T> {
        let page = self.current_page().await?;
        let doc = page.dom();
        crate::extract::extract_from(&doc, selector, opt)
    }

    pub(crate) async fn take_pending(&self) -> Vec<(String, String)> {
        std::mem::take(&mut self.state.write().await.pending_fields)
    }

    /// Number of `send_keys` values queued for the next submission.
    pub async fn pending_len(&self) -> usize {
        self.state.read().await.pending_fields.len()
    }
}

/// Pulls the element name out of selectors like `input[name=user]` or
/// `[name="q"]`.
pub(crate) fn field_name_from_selector(selector: &str) -> Result<String> {
    FIELD_NAME_RE
        .captures(selector)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| {
            Error::Form(format!(
                "cannot derive a field name from selector {selector:?}"
            ))
        })
}

fn apply_pending(form: &mut Form, pending: &[(String, String)]) -> Result<()> {
    for (selector, value) in pending {
        let name = field_name_from_selector(selector)?;
        form.set(&name, value)?;
    }
    Ok(())
}
