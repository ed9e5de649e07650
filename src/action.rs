//! Backend-agnostic command values.
//!
//! An [`Action`] is one scripted step, runnable against either backend
//! through a [`ScraperRef`]. A sequence of actions is plain data: it can be
//! built once, logged, wrapped for retry, and run unchanged against the
//! HTTP session in replay mode or a live browser. Execution is in order and
//! stops at the first error.

use crate::browser::{BrowserSession, DownloadOptions};
use crate::extract::live::ExtractLive;
use crate::extract::{Extract, ExtractModel, ExtractOptions};
use crate::session::Session;
use crate::{Error, Result};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A borrowed handle to either backend. Command dispatch is a plain match
/// on the variant; both arms expose the same command surface.
#[derive(Clone, Copy)]
pub enum ScraperRef<'a> {
    Http(&'a Session),
    Browser(&'a BrowserSession),
}

impl<'a> ScraperRef<'a> {
    pub fn session(&self) -> &'a Session {
        match self {
            ScraperRef::Http(session) => session,
            ScraperRef::Browser(browser) => browser.session(),
        }
    }

    pub async fn is_replay(&self) -> bool {
        self.session().is_replay().await
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        match self {
            ScraperRef::Http(s) => s.do_navigate(url).await,
            ScraperRef::Browser(b) => b.do_navigate(url).await,
        }
    }

    pub async fn wait_visible(&self, selector: &str) -> Result<()> {
        match self {
            ScraperRef::Http(s) => s.do_wait_visible(selector).await,
            ScraperRef::Browser(b) => b.do_wait_visible(selector).await,
        }
    }

    pub async fn send_keys(&self, selector: &str, value: &str) -> Result<()> {
        match self {
            ScraperRef::Http(s) => s.do_send_keys(selector, value).await,
            ScraperRef::Browser(b) => b.do_send_keys(selector, value).await,
        }
    }

    pub async fn click(&self, selector: &str) -> Result<()> {
        match self {
            ScraperRef::Http(s) => s.do_click(selector).await,
            ScraperRef::Browser(b) => b.do_click(selector).await,
        }
    }

    pub async fn submit_form(
        &self,
        selector: &str,
        params: Option<&BTreeMap<String, String>>,
    ) -> Result<()> {
        match self {
            ScraperRef::Http(s) => s.do_submit_form(selector, params).await.map(|_| ()),
            ScraperRef::Browser(b) => b.do_submit_form(selector, params).await,
        }
    }

    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        match self {
            ScraperRef::Http(s) => s.do_sleep(duration).await,
            ScraperRef::Browser(b) => b.do_sleep(duration).await,
        }
    }

    pub async fn save_page(&self) -> Result<PathBuf> {
        match self {
            ScraperRef::Http(s) => s.do_save_page().await,
            ScraperRef::Browser(b) => b.do_save_page().await,
        }
    }

    pub async fn download(&self, selector: &str, options: &DownloadOptions) -> Result<PathBuf> {
        match self {
            ScraperRef::Http(_) => Err(Error::UnsupportedAction {
                action: "download",
                backend: "http",
            }),
            ScraperRef::Browser(b) => b.do_download(selector, options).await,
        }
    }

    pub async fn current_url(&self) -> Result<String> {
        match self {
            ScraperRef::Http(s) => s.current_url().await,
            ScraperRef::Browser(b) => b.current_url().await,
        }
    }

    /// Runs the actions in order, short-circuiting on the first error.
    pub async fn run(&self, actions: &[Action]) -> Result<()> {
        for action in actions {
            (action.run)(*self).await?;
        }
        Ok(())
    }
}

type ActionFn = dyn for<'a> Fn(ScraperRef<'a>) -> BoxFuture<'a, Result<()>> + Send + Sync;

/// One scripted command. Build them with the constructors in this module,
/// or wrap a function with [`Action::from_fn`] to compose primitives.
pub struct Action {
    run: Box<ActionFn>,
}

impl Action {
    pub fn from_fn<F>(f: F) -> Action
    where
        F: for<'a> Fn(ScraperRef<'a>) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        Action { run: Box::new(f) }
    }
}

/// Shared destination slot for [`extract_into`] and [`download`]: the
/// action stores its result here, the caller takes it after the run.
pub struct DataSlot<T> {
    value: Arc<Mutex<Option<T>>>,
}

impl<T> DataSlot<T> {
    pub fn new() -> Self {
        Self {
            value: Arc::new(Mutex::new(None)),
        }
    }

    pub fn take(&self) -> Option<T> {
        self.value.lock().unwrap().take()
    }

    fn put(&self, value: T) {
        *self.value.lock().unwrap() = Some(value);
    }
}

impl<T> Default for DataSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for DataSlot<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
        }
    }
}

pub fn navigate(url: impl Into<String>) -> Action {
    let url = url.into();
    Action::from_fn(move |s| {
        let url = url.clone();
        Box::pin(async move { s.navigate(&url).await })
    })
}

pub fn wait_visible(selector: impl Into<String>) -> Action {
    let selector = selector.into();
    Action::from_fn(move |s| {
        let selector = selector.clone();
        Box::pin(async move { s.wait_visible(&selector).await })
    })
}

pub fn send_keys(selector: impl Into<String>, value: impl Into<String>) -> Action {
    let selector = selector.into();
    let value = value.into();
    Action::from_fn(move |s| {
        let selector = selector.clone();
        let value = value.clone();
        Box::pin(async move { s.send_keys(&selector, &value).await })
    })
}

pub fn click(selector: impl Into<String>) -> Action {
    let selector = selector.into();
    Action::from_fn(move |s| {
        let selector = selector.clone();
        Box::pin(async move { s.click(&selector).await })
    })
}

pub fn submit_form(
    selector: impl Into<String>,
    params: Option<BTreeMap<String, String>>,
) -> Action {
    let selector = selector.into();
    Action::from_fn(move |s| {
        let selector = selector.clone();
        let params = params.clone();
        Box::pin(async move { s.submit_form(&selector, params.as_ref()).await })
    })
}

/// Replay-aware pause: a no-op (logged) when the session is replaying.
pub fn sleep(duration: Duration) -> Action {
    Action::from_fn(move |s| {
        Box::pin(async move {
            if s.is_replay().await {
                tracing::debug!(?duration, "replay: skipping sleep");
                return Ok(());
            }
            s.sleep(duration).await
        })
    })
}

pub fn save_page() -> Action {
    Action::from_fn(|s| {
        Box::pin(async move {
            let path = s.save_page().await?;
            tracing::debug!(file = %path.display(), "page saved");
            Ok(())
        })
    })
}

/// Browser-only: triggers a download by clicking `selector` and stores the
/// finished file's path in `slot`.
pub fn download(
    slot: DataSlot<PathBuf>,
    selector: impl Into<String>,
    options: DownloadOptions,
) -> Action {
    let selector = selector.into();
    Action::from_fn(move |s| {
        let slot = slot.clone();
        let selector = selector.clone();
        let options = options.clone();
        Box::pin(async move {
            let path = s.download(&selector, &options).await?;
            slot.put(path);
            Ok(())
        })
    })
}

/// Extracts a record from the nodes matching `selector` and stores it in
/// `slot`. Uses the parsed current page on the HTTP backend and the live
/// DOM walk on the browser backend.
pub fn extract_into<T>(
    slot: DataSlot<T>,
    selector: impl Into<String>,
    options: ExtractOptions,
) -> Action
where
    T: Extract + ExtractLive + ExtractModel + Send + 'static,
{
    let selector = selector.into();
    Action::from_fn(move |s| {
        let slot = slot.clone();
        let selector = selector.clone();
        let options = options.clone();
        Box::pin(async move {
            let value = match s {
                ScraperRef::Http(session) => session.extract::<T>(&selector, &options).await?,
                ScraperRef::Browser(browser) => browser.extract::<T>(&selector, &options).await?,
            };
            slot.put(value);
            Ok(())
        })
    })
}

impl Session {
    /// Runs a sequence of actions against the HTTP backend.
    pub async fn run(&self, actions: &[Action]) -> Result<()> {
        ScraperRef::Http(self).run(actions).await
    }
}

impl BrowserSession {
    /// Runs a sequence of actions against the browser backend.
    pub async fn run(&self, actions: &[Action]) -> Result<()> {
        ScraperRef::Browser(self).run(actions).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn custom_actions_compose_primitives() {
        let session = Session::new("action-compose").unwrap();
        let touched = DataSlot::<bool>::new();
        let slot = touched.clone();
        let action = Action::from_fn(move |s| {
            let slot = slot.clone();
            Box::pin(async move {
                s.send_keys("input[name=user]", "alice").await?;
                slot.put(true);
                Ok(())
            })
        });

        session.run(&[action]).await.unwrap();
        assert_eq!(touched.take(), Some(true));
        assert_eq!(session.pending_len().await, 1);
    }

    #[tokio::test]
    async fn run_short_circuits_on_first_error() {
        let session = Session::new("action-short-circuit").unwrap();
        let reached = DataSlot::<bool>::new();
        let slot = reached.clone();

        let failing = Action::from_fn(|s| {
            Box::pin(async move {
                // no page loaded yet
                s.click("a").await
            })
        });
        let after = Action::from_fn(move |_| {
            let slot = slot.clone();
            Box::pin(async move {
                slot.put(true);
                Ok(())
            })
        });

        assert!(session.run(&[failing, after]).await.is_err());
        assert_eq!(reached.take(), None);
    }

    #[tokio::test]
    async fn download_is_rejected_on_http_backend() {
        let session = Session::new("action-download-http").unwrap();
        let err = ScraperRef::Http(&session)
            .download("a.file", &DownloadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedAction { .. }));
    }

    #[tokio::test]
    async fn sleep_is_skipped_in_replay() {
        let session = Session::new("action-sleep")
            .unwrap()
            .with_not_use_network(true);
        let start = std::time::Instant::now();
        session.run(&[sleep(Duration::from_secs(5))]).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
