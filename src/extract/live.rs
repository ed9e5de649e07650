//! Browser-side extraction over CDP.
//!
//! The live DOM cannot hand out borrowed node handles the way a parsed
//! document can, so sequence walks address elements by selector: position i
//! of a walk resolves through the `:nth-of-type` rewrite in [`super::nth`]
//! rather than re-querying the whole match list per element. Text
//! acquisition and regex filtering happen once per walk step.

use super::{ExtractOptions, apply_re, compile_re, nth};
use crate::{Error, Result};
use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::element::Element;

/// Handle to the live DOM the extractor walks.
pub struct LiveDom<'a> {
    page: &'a Page,
}

impl<'a> LiveDom<'a> {
    pub fn new(page: &'a Page) -> Self {
        Self { page }
    }

    /// All elements matching `selector`; an unmatched selector is an empty
    /// list, not an error.
    async fn elements(&self, selector: &str) -> Vec<Element> {
        match self.page.find_elements(selector).await {
            Ok(elements) => elements,
            Err(e) => {
                tracing::trace!(selector, error = %e, "no nodes for selector");
                Vec::new()
            }
        }
    }
}

/// Types that can be populated from the live DOM. `texts` carries the
/// already-acquired (and regex-filtered) text per match of `selector`.
#[async_trait]
pub trait ExtractLive: Sized {
    async fn extract_live(
        dom: &LiveDom<'_>,
        selector: &str,
        texts: Vec<String>,
        opt: &ExtractOptions,
    ) -> Result<Self>;
}

/// Acquires the text of every element matching `selector`: inner HTML when
/// `html` is set, else the attribute (absent attribute skips the element),
/// else the rendered text. The regex filter applies per element.
pub async fn collect_texts(
    dom: &LiveDom<'_>,
    selector: &str,
    opt: &ExtractOptions,
) -> Result<Vec<String>> {
    let re = compile_re(opt)?;
    let mut texts = Vec::new();
    for element in dom.elements(selector).await {
        let text = if opt.html {
            element.inner_html().await.ok().flatten().unwrap_or_default()
        } else if let Some(attr) = opt.attr.as_deref() {
            match element.attribute(attr).await {
                Ok(Some(v)) => v,
                _ => continue,
            }
        } else {
            element.inner_text().await.ok().flatten().unwrap_or_default()
        };

        match &re {
            None => texts.push(text),
            Some(re) => {
                if let Some(t) = apply_re(re, opt, &text)? {
                    texts.push(t);
                }
            }
        }
    }
    Ok(texts)
}

#[async_trait]
impl<T: ExtractLive + Send> ExtractLive for Vec<T> {
    async fn extract_live(
        dom: &LiveDom<'_>,
        selector: &str,
        texts: Vec<String>,
        opt: &ExtractOptions,
    ) -> Result<Self> {
        nth::check_rewritable(selector)?;
        let mut out = Vec::with_capacity(texts.len());
        for (i, text) in texts.into_iter().enumerate() {
            let step = nth::resolve_nth_of_type(selector, i);
            let value = T::extract_live(dom, &step, vec![text], opt)
                .await
                .map_err(|e| Error::index(i, e))?;
            out.push(value);
        }
        Ok(out)
    }
}

#[async_trait]
impl<T: ExtractLive + Send> ExtractLive for Option<T> {
    async fn extract_live(
        dom: &LiveDom<'_>,
        selector: &str,
        texts: Vec<String>,
        opt: &ExtractOptions,
    ) -> Result<Self> {
        if texts.is_empty() {
            return Ok(None);
        }
        T::extract_live(dom, selector, texts, opt).await.map(Some)
    }
}
