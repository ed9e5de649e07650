//! Decoded page model: UTF-8 body, base URL, meta-refresh handling.
//!
//! The parsed DOM (`scraper::Html`) is not `Send`, so `Page` keeps the
//! decoded body as a string and parses on demand inside synchronous scopes.
//! Nothing DOM-shaped ever crosses an await point.

use crate::{Error, Result};
use encoding_rs::Encoding;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// Hook run over the decoded body before parsing. Callers use it to turn
/// application-level sentinel pages into `Login`/`Maintenance` errors.
pub type BodyFilter = dyn Fn(&str) -> Result<String> + Send + Sync;

static CHARSET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\bcharset=["']?([^"';\s]+)"#).unwrap());
static META_REFRESH_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)url=(.*)$").unwrap());

/// Resolves a charset label to an encoding, or `None` when the body needs no
/// conversion. UTF-8 maps to `None` on purpose: the body is used as-is.
/// `cp932` is accepted as a Shift_JIS synonym on top of the WHATWG labels
/// (`shift_jis`, `windows-31j`, `x-sjis`, `sjis`, `shift-jis`).
pub fn encoding_from_charset(charset: &str) -> Option<&'static Encoding> {
    let label = charset.trim().trim_matches(|c| c == '"' || c == '\'');
    let label = if label.eq_ignore_ascii_case("cp932") {
        "windows-31j"
    } else {
        label
    };
    Encoding::for_label(label.as_bytes()).filter(|e| *e != encoding_rs::UTF_8)
}

/// Pulls the charset parameter out of a Content-Type header value.
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    CHARSET_RE
        .captures(content_type)
        .map(|caps| caps[1].to_string())
}

pub(crate) fn decode(raw: &[u8], encoding: Option<&'static Encoding>) -> Result<String> {
    match encoding {
        None => Ok(String::from_utf8_lossy(raw).into_owned()),
        Some(e) => {
            let (text, _, had_errors) = e.decode(raw);
            if had_errors {
                return Err(Error::Encoding(format!("body is not valid {}", e.name())));
            }
            Ok(text.into_owned())
        }
    }
}

fn charset_from_head(doc: &Html) -> Option<String> {
    let meta_charset = Selector::parse("head meta[charset]").unwrap();
    let meta_http_equiv = Selector::parse("head meta[http-equiv]").unwrap();

    let mut charset = doc
        .select(&meta_charset)
        .next()
        .and_then(|m| m.value().attr("charset"))
        .map(str::to_string);

    for meta in doc.select(&meta_http_equiv) {
        if meta
            .value()
            .attr("http-equiv")
            .is_some_and(|v| v.eq_ignore_ascii_case("content-type"))
            && let Some(content) = meta.value().attr("content")
            && let Some(cs) = charset_from_content_type(content)
        {
            charset = Some(cs);
        }
    }
    charset
}

/// A fully decoded page. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Page {
    body: String,
    url: Url,
    base_url: Url,
    content_type: String,
}

impl Page {
    /// Builds a page from raw response bytes. Encoding resolution order:
    /// session override, then the Content-Type charset, then a charset
    /// declared in the document head. Conversion failures abort the load.
    pub fn build(
        raw: &[u8],
        content_type: &str,
        url: Url,
        encoding_override: Option<&'static Encoding>,
        body_filter: Option<&BodyFilter>,
    ) -> Result<Page> {
        let mut encoding =
            encoding_override.or_else(|| {
                charset_from_content_type(content_type).and_then(|cs| encoding_from_charset(&cs))
            });

        let mut body = decode(raw, encoding)?;

        if encoding.is_none() {
            let head_encoding = {
                let doc = Html::parse_document(&body);
                charset_from_head(&doc).and_then(|cs| encoding_from_charset(&cs))
            };
            if let Some(e) = head_encoding {
                tracing::debug!(encoding = e.name(), "converting body per document head");
                body = decode(raw, Some(e))?;
                encoding = Some(e);
            }
        }
        let _ = encoding;

        if let Some(filter) = body_filter {
            body = filter(&body)?;
        }

        let base_url = {
            let doc = Html::parse_document(&body);
            let base_sel = Selector::parse("head base[href]").unwrap();
            match doc.select(&base_sel).next().and_then(|b| b.value().attr("href")) {
                Some(href) => url.join(href)?,
                None => url.clone(),
            }
        };

        Ok(Page {
            body,
            url,
            base_url,
            content_type: content_type.to_string(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Parses the body. The returned tree borrows nothing and is meant for
    /// short synchronous scopes.
    pub fn dom(&self) -> Html {
        Html::parse_document(&self.body)
    }

    pub fn title(&self) -> Option<String> {
        let doc = self.dom();
        let sel = Selector::parse("title").unwrap();
        doc.select(&sel)
            .next()
            .map(|t| t.text().collect::<String>())
    }

    /// Returns the target of a `<meta http-equiv=refresh>` tag, resolved
    /// against the base URL, or `None` when the page has none.
    pub fn meta_refresh(&self) -> Option<Url> {
        let doc = self.dom();
        let sel = Selector::parse("meta[http-equiv]").unwrap();
        for meta in doc.select(&sel) {
            if meta
                .value()
                .attr("http-equiv")
                .is_some_and(|v| v.eq_ignore_ascii_case("refresh"))
                && let Some(content) = meta.value().attr("content")
                && let Some(caps) = META_REFRESH_URL_RE.captures(content)
                && let Ok(url) = self.base_url.join(caps[1].trim())
            {
                return Some(url);
            }
        }
        None
    }

    /// Resolves a possibly relative link against the base URL.
    pub fn resolve_link(&self, relative: &str) -> Result<Url> {
        Ok(self.base_url.join(relative)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(html: &str) -> Page {
        Page::build(
            html.as_bytes(),
            "text/html",
            Url::parse("http://localhost/dir/index.html").unwrap(),
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn charset_from_content_type_variants() {
        assert_eq!(
            charset_from_content_type("text/html; charset=UTF-8").as_deref(),
            Some("UTF-8")
        );
        assert_eq!(
            charset_from_content_type("text/html; charset=\"Shift_JIS\"").as_deref(),
            Some("Shift_JIS")
        );
        assert_eq!(charset_from_content_type("text/html"), None);
    }

    #[test]
    fn shift_jis_synonyms_resolve_to_one_encoding() {
        for label in ["shift_jis", "windows-31j", "cp932", "x-sjis", "sjis", "shift-jis", "SHIFT_JIS"] {
            assert_eq!(
                encoding_from_charset(label),
                Some(encoding_rs::SHIFT_JIS),
                "label {label}"
            );
        }
        assert_eq!(encoding_from_charset("utf-8"), None);
        assert_eq!(encoding_from_charset("euc-jp"), Some(encoding_rs::EUC_JP));
    }

    #[test]
    fn shift_jis_body_is_decoded() {
        // "テスト" in Shift_JIS
        let raw: &[u8] = &[0x83, 0x65, 0x83, 0x58, 0x83, 0x67];
        let mut html = b"<html><body>".to_vec();
        html.extend_from_slice(raw);
        html.extend_from_slice(b"</body></html>");

        let page = Page::build(
            &html,
            "text/html; charset=Shift_JIS",
            Url::parse("http://localhost/").unwrap(),
            None,
            None,
        )
        .unwrap();
        assert!(page.body().contains("テスト"));
    }

    #[test]
    fn head_charset_is_used_when_header_has_none() {
        let mut html = b"<html><head><meta charset=\"shift_jis\"></head><body>".to_vec();
        html.extend_from_slice(&[0x83, 0x65, 0x83, 0x58, 0x83, 0x67]);
        html.extend_from_slice(b"</body></html>");

        let page = Page::build(
            &html,
            "text/html",
            Url::parse("http://localhost/").unwrap(),
            None,
            None,
        )
        .unwrap();
        assert!(page.body().contains("テスト"));
    }

    #[test]
    fn base_href_overrides_base_url() {
        let page = page("<html><head><base href=\"http://other.example/sub/\"></head></html>");
        assert_eq!(page.base_url().as_str(), "http://other.example/sub/");
        assert_eq!(
            page.resolve_link("a.html").unwrap().as_str(),
            "http://other.example/sub/a.html"
        );
    }

    #[test]
    fn relative_links_resolve_against_page_url() {
        let page = page("<html><body></body></html>");
        assert_eq!(
            page.resolve_link("/second").unwrap().as_str(),
            "http://localhost/second"
        );
        assert_eq!(
            page.resolve_link("other.html").unwrap().as_str(),
            "http://localhost/dir/other.html"
        );
    }

    #[test]
    fn meta_refresh_is_case_insensitive_and_resolved() {
        let page = page(r#"<meta http-equiv="Refresh" content="0;URL=/second">"#);
        assert_eq!(
            page.meta_refresh().unwrap().as_str(),
            "http://localhost/second"
        );

        let none = page_without_refresh();
        assert_eq!(none.meta_refresh(), None);
    }

    fn page_without_refresh() -> Page {
        page("<html><body><h1>no refresh</h1></body></html>")
    }

    #[test]
    fn body_filter_runs_and_may_reject() {
        let filter = |body: &str| {
            if body.contains("maintenance") {
                Err(Error::Maintenance("scheduled".into()))
            } else {
                Ok(body.to_string())
            }
        };
        let err = Page::build(
            b"<html><body>maintenance</body></html>",
            "text/html",
            Url::parse("http://localhost/").unwrap(),
            None,
            Some(&filter),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Maintenance(_)));
    }

    #[test]
    fn title_text() {
        let page = page("<html><head><title>Test Page</title></head></html>");
        assert_eq!(page.title().as_deref(), Some("Test Page"));
    }
}
