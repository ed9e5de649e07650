//! Structured view of an HTML form.
//!
//! A `Form` is detached from the DOM once built: it owns the action, method,
//! and a name-keyed element map, so it can be mutated and submitted after the
//! parse scope ends. Element order on the wire is the map's sorted-by-name
//! order, which keeps request bodies deterministic.

use crate::page::Page;
use crate::{Error, Result};
use encoding_rs::Encoding;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Text,
    Email,
    Password,
    Hidden,
    Submit,
    Button,
    Checkbox,
    Radio,
    Select,
    Image,
    Other(String),
}

impl ElementKind {
    fn parse(raw: &str) -> ElementKind {
        match raw.to_ascii_lowercase().as_str() {
            "text" => ElementKind::Text,
            "email" => ElementKind::Email,
            "password" => ElementKind::Password,
            "hidden" => ElementKind::Hidden,
            "submit" => ElementKind::Submit,
            "button" => ElementKind::Button,
            "checkbox" => ElementKind::Checkbox,
            "radio" => ElementKind::Radio,
            "select" => ElementKind::Select,
            "image" => ElementKind::Image,
            other => ElementKind::Other(other.to_string()),
        }
    }
}

/// A concrete choice an element can take: the wire value plus the
/// user-visible label (from `<label for>` or `<option>` text).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValue {
    pub value: String,
    pub label: String,
}

impl FieldValue {
    fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormElement {
    pub kind: ElementKind,
    pub name: String,
    /// Current value; `None` means unchecked/unselected.
    pub value: Option<FieldValue>,
    /// Enumerated choices; `None` for free-input controls.
    pub available: Option<Vec<FieldValue>>,
}

impl FormElement {
    fn describe_available(&self) -> String {
        let mut out = String::from("[");
        if let Some(values) = &self.available {
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "({:?}, {:?})", v.value, v.label);
            }
        }
        out.push(']');
        out
    }
}

#[derive(Debug, Clone)]
pub struct Form {
    url: Url,
    base_url: Url,
    pub action: String,
    pub method: String,
    pub elements: BTreeMap<String, FormElement>,
}

/// Everything needed to put a form on the wire.
#[derive(Debug, Clone)]
pub struct FormSubmission {
    pub method: String,
    pub url: Url,
    pub body: String,
    pub referer: String,
    pub pairs: BTreeMap<String, String>,
}

impl Page {
    /// Builds a `Form` from the single element matching `selector`.
    pub fn form(&self, selector: &str) -> Result<Form> {
        let doc = self.dom();
        let sel =
            Selector::parse(selector).map_err(|_| Error::Selector(selector.to_string()))?;
        let forms: Vec<ElementRef<'_>> = doc.select(&sel).collect();
        if forms.len() != 1 {
            return Err(Error::Form(format!(
                "selector={selector:?}, found {} items",
                forms.len()
            )));
        }
        Form::from_element(&doc, forms[0], self.url(), self.base_url())
    }
}

fn label_for(doc: &Html, id: &str) -> Option<String> {
    // `.` and `:` would otherwise terminate the identifier in the selector.
    let escaped = id.replace('.', "\\.").replace(':', "\\:");
    let sel = Selector::parse(&format!("label[for={escaped}]")).ok()?;
    doc.select(&sel)
        .next()
        .map(|l| l.text().collect::<String>())
}

impl Form {
    pub(crate) fn from_element(
        doc: &Html,
        form_el: ElementRef<'_>,
        page_url: &Url,
        base_url: &Url,
    ) -> Result<Form> {
        let input_sel = Selector::parse("input").unwrap();
        let select_sel = Selector::parse("select").unwrap();
        let option_sel = Selector::parse("option").unwrap();

        let mut elements: BTreeMap<String, FormElement> = BTreeMap::new();

        for input in form_el.select(&input_sel) {
            let Some(name) = input.value().attr("name") else {
                // Submit buttons legitimately go nameless; anything else is
                // worth a trace line.
                let kind = input.value().attr("type").unwrap_or("text");
                if !kind.eq_ignore_ascii_case("submit") {
                    tracing::debug!(kind, "input element without name, ignoring");
                }
                continue;
            };

            let kind = ElementKind::parse(input.value().attr("type").unwrap_or("text"));

            let mut val = match input.value().attr("value") {
                Some(v) => FieldValue::new(v),
                // An unvalued radio submits "on", per the HTML default.
                None if kind == ElementKind::Radio => FieldValue::new("on"),
                None => FieldValue::new(""),
            };
            if let Some(id) = input.value().attr("id")
                && let Some(label) = label_for(doc, id)
            {
                val.label = label;
            }

            let element = elements.entry(name.to_string()).or_insert_with(|| FormElement {
                kind: kind.clone(),
                name: name.to_string(),
                value: None,
                available: None,
            });

            let checked = input.value().attr("checked").is_some();
            match kind {
                ElementKind::Checkbox => {
                    element.available = Some(vec![val.clone()]);
                    if checked {
                        element.value = Some(val);
                    }
                }
                ElementKind::Radio => {
                    element
                        .available
                        .get_or_insert_with(Vec::new)
                        .push(val.clone());
                    if checked || element.value.is_none() {
                        element.value = Some(val);
                    }
                }
                ElementKind::Select => {}
                _ => {
                    element.value = Some(val);
                }
            }
        }

        for select in form_el.select(&select_sel) {
            let Some(name) = select.value().attr("name") else {
                continue;
            };
            let element = elements.entry(name.to_string()).or_insert_with(|| FormElement {
                kind: ElementKind::Select,
                name: name.to_string(),
                value: None,
                available: None,
            });

            for option in select.select(&option_sel) {
                // Options without an explicit value never reach the wire.
                let Some(value) = option.value().attr("value") else {
                    continue;
                };
                let val = FieldValue {
                    value: value.to_string(),
                    label: option.text().collect(),
                };
                element
                    .available
                    .get_or_insert_with(Vec::new)
                    .push(val.clone());

                if option.value().attr("selected").is_some() || element.value.is_none() {
                    element.value = Some(val);
                }
            }
        }

        Ok(Form {
            url: page_url.clone(),
            base_url: base_url.clone(),
            action: form_el.value().attr("action").unwrap_or("").to_string(),
            method: form_el.value().attr("method").unwrap_or("get").to_string(),
            elements,
        })
    }

    pub fn page_url(&self) -> &Url {
        &self.url
    }

    fn element_mut(&mut self, name: &str) -> Result<&mut FormElement> {
        self.elements
            .get_mut(name)
            .ok_or_else(|| Error::FormElementNotFound {
                name: name.to_string(),
            })
    }

    fn element(&self, name: &str) -> Result<&FormElement> {
        self.elements
            .get(name)
            .ok_or_else(|| Error::FormElementNotFound {
                name: name.to_string(),
            })
    }

    /// Sets a value. Elements with enumerated choices only accept one of
    /// them; the error lists what was available.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let element = self.element_mut(name)?;
        match &element.available {
            None => {
                element.value = Some(FieldValue::new(value));
            }
            Some(values) => {
                let found = values.iter().find(|v| v.value == value).cloned();
                match found {
                    Some(v) => element.value = Some(v),
                    None => {
                        return Err(Error::Form(format!(
                            "value {:?} is not available in {} for element {}",
                            value,
                            element.describe_available(),
                            name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Like `set`, but injects a hidden element when the form has none with
    /// this name. Some sites add fields from JavaScript at submit time.
    pub fn set_force(&mut self, name: &str, value: &str) -> Result<()> {
        if self.elements.contains_key(name) {
            return self.set(name, value);
        }
        self.elements.insert(
            name.to_string(),
            FormElement {
                kind: ElementKind::Hidden,
                name: name.to_string(),
                value: Some(FieldValue::new(value)),
                available: None,
            },
        );
        Ok(())
    }

    /// Looks up the wire value whose label matches.
    pub fn value_by_label(&self, name: &str, label: &str) -> Result<String> {
        let element = self.element(name)?;
        let Some(values) = &element.available else {
            return Err(Error::Form(format!(
                "form element {name} is not a selection"
            )));
        };
        for v in values {
            if v.label == label {
                return Ok(v.value.clone());
            }
        }
        self.print_selection(name)?;
        Err(Error::Form(format!(
            "label {label:?} is not found in form element {name}"
        )))
    }

    pub fn set_by_label(&mut self, name: &str, label: &str) -> Result<()> {
        let value = self.value_by_label(name, label)?;
        self.set(name, &value)
    }

    /// Dumps an element's choices to the trace log, marking the current one.
    pub fn print_selection(&self, name: &str) -> Result<()> {
        let element = self.element(name)?;
        match &element.available {
            None => match &element.value {
                None => tracing::debug!(name, "no value"),
                Some(v) => tracing::debug!(name, label = %v.label, "* current"),
            },
            Some(values) => {
                for v in values {
                    let mark = if element.value.as_ref() == Some(v) { "*" } else { " " };
                    tracing::debug!(name, "{mark} {:?} ({:?})", v.label, v.value);
                }
            }
        }
        Ok(())
    }

    /// Unsets (or unchecks) an element.
    pub fn unset(&mut self, name: &str) -> Result<()> {
        self.element_mut(name)?.value = None;
        Ok(())
    }

    pub fn check(&mut self, name: &str) -> Result<()> {
        self.select_index(name, 0)
    }

    pub fn uncheck(&mut self, name: &str) -> Result<()> {
        self.unset(name)
    }

    pub fn num_options(&self, name: &str) -> Result<usize> {
        Ok(self
            .element(name)?
            .available
            .as_ref()
            .map(Vec::len)
            .unwrap_or(0))
    }

    pub fn select_index(&mut self, name: &str, index: usize) -> Result<()> {
        let element = self.element_mut(name)?;
        let available = element.available.as_deref().unwrap_or(&[]);
        let Some(v) = available.get(index) else {
            return Err(Error::Form(format!(
                "select out of range {index} in {}",
                element.describe_available()
            )));
        };
        element.value = Some(v.clone());
        Ok(())
    }

    /// Assembles the wire form. Elements with no current value are omitted.
    /// `image` inputs contribute click pseudo-coordinates instead of their
    /// value; with no specific target, every image gets them.
    pub fn submission(
        &self,
        image_target: Option<&str>,
        transcode: Option<&'static Encoding>,
    ) -> Result<FormSubmission> {
        let mut pairs: BTreeMap<String, String> = BTreeMap::new();
        for (name, element) in &self.elements {
            let Some(value) = &element.value else {
                continue;
            };
            if element.kind == ElementKind::Image {
                if image_target.is_none() || image_target == Some(name.as_str()) {
                    pairs.insert(format!("{name}.x"), "0".into());
                    pairs.insert(format!("{name}.y"), "0".into());
                }
            } else {
                pairs.insert(name.clone(), value.value.clone());
            }
        }

        let mut body = String::new();
        for (k, v) in &pairs {
            if !body.is_empty() {
                body.push('&');
            }
            form_escape(k.as_bytes(), &mut body);
            body.push('=');
            match transcode {
                Some(e) => form_escape(&e.encode(v).0, &mut body),
                None => form_escape(v.as_bytes(), &mut body),
            }
        }

        Ok(FormSubmission {
            method: self.method.to_uppercase(),
            url: self.base_url.join(&self.action)?,
            body,
            referer: self.url.to_string(),
            pairs,
        })
    }
}

/// application/x-www-form-urlencoded escaping over raw bytes, so values
/// already transcoded to a legacy encoding survive intact.
fn form_escape(bytes: &[u8], out: &mut String) {
    for &b in bytes {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => {
                let _ = write!(out, "%{b:02X}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(html: &str) -> Page {
        Page::build(
            html.as_bytes(),
            "text/html",
            Url::parse("http://localhost/form").unwrap(),
            None,
            None,
        )
        .unwrap()
    }

    const LOGIN_FORM: &str = r#"<html><body>
        <form action="/submit" method="post">
            <input name="user">
            <input name="pass" type="password">
            <input type="hidden" name="token" value="t0k3n">
            <input type="submit" value="Go">
        </form>
    </body></html>"#;

    #[test]
    fn parses_inputs_with_type_defaults() {
        let form = page(LOGIN_FORM).form("form").unwrap();
        assert_eq!(form.method, "post");
        assert_eq!(form.action, "/submit");
        assert_eq!(form.elements["user"].kind, ElementKind::Text);
        assert_eq!(form.elements["pass"].kind, ElementKind::Password);
        assert_eq!(
            form.elements["token"].value.as_ref().unwrap().value,
            "t0k3n"
        );
    }

    #[test]
    fn form_selector_must_match_exactly_one() {
        let html = "<form id=a></form><form id=b></form>";
        let err = page(html).form("form").unwrap_err();
        assert!(err.to_string().contains("found 2 items"));
    }

    #[test]
    fn set_and_submit_uses_values_not_labels() {
        let html = r#"<form action="/s" method="post">
            <select name="pref">
                <option value="13">Tokyo</option>
                <option value="27">Osaka</option>
            </select>
        </form>"#;
        let mut form = page(html).form("form").unwrap();

        // first option selected by default
        assert_eq!(form.elements["pref"].value.as_ref().unwrap().value, "13");

        form.set_by_label("pref", "Osaka").unwrap();
        let sub = form.submission(None, None).unwrap();
        assert_eq!(sub.body, "pref=27");
        assert_eq!(sub.method, "POST");
        assert_eq!(sub.url.as_str(), "http://localhost/s");
        assert_eq!(sub.referer, "http://localhost/form");
    }

    #[test]
    fn set_rejects_unavailable_value_listing_choices() {
        let html = r#"<form>
            <select name="pref">
                <option value="13">Tokyo</option>
            </select>
        </form>"#;
        let mut form = page(html).form("form").unwrap();
        let err = form.set("pref", "99").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("\"13\""), "{msg}");
        assert!(msg.contains("Tokyo"), "{msg}");
    }

    #[test]
    fn missing_element_is_typed_error() {
        let mut form = page(LOGIN_FORM).form("form").unwrap();
        assert!(matches!(
            form.set("nope", "x"),
            Err(Error::FormElementNotFound { .. })
        ));
    }

    #[test]
    fn checkbox_is_explicit_only() {
        let html = r#"<form>
            <input type="checkbox" name="a" value="1">
            <input type="checkbox" name="b" value="2" checked>
        </form>"#;
        let mut form = page(html).form("form").unwrap();
        assert!(form.elements["a"].value.is_none());
        assert_eq!(form.elements["b"].value.as_ref().unwrap().value, "2");

        form.check("a").unwrap();
        form.uncheck("b").unwrap();
        let sub = form.submission(None, None).unwrap();
        assert_eq!(sub.body, "a=1");
    }

    #[test]
    fn radio_defaults_to_first_and_value_on() {
        let html = r#"<form>
            <input type="radio" name="color" value="red">
            <input type="radio" name="color" value="blue">
            <input type="radio" name="bare">
        </form>"#;
        let form = page(html).form("form").unwrap();
        assert_eq!(form.elements["color"].value.as_ref().unwrap().value, "red");
        assert_eq!(form.elements["bare"].value.as_ref().unwrap().value, "on");
    }

    #[test]
    fn radio_checked_wins_over_first() {
        let html = r#"<form>
            <input type="radio" name="color" value="red">
            <input type="radio" name="color" value="blue" checked>
        </form>"#;
        let form = page(html).form("form").unwrap();
        assert_eq!(form.elements["color"].value.as_ref().unwrap().value, "blue");
    }

    #[test]
    fn labels_resolve_through_for_attribute() {
        let html = r#"<form>
            <input type="radio" name="plan" id="p.basic" value="1">
            <label for="p.basic">Basic</label>
            <input type="radio" name="plan" id="p.pro" value="2">
            <label for="p.pro">Pro</label>
        </form>"#;
        let mut form = page(html).form("form").unwrap();
        form.set_by_label("plan", "Pro").unwrap();
        assert_eq!(form.elements["plan"].value.as_ref().unwrap().value, "2");
    }

    #[test]
    fn image_inputs_submit_pseudo_coordinates() {
        let html = r#"<form>
            <input name="q" value="term">
            <input type="image" name="go" value="ignored">
            <input type="image" name="alt" value="ignored">
        </form>"#;
        let form = page(html).form("form").unwrap();

        let all = form.submission(None, None).unwrap();
        assert_eq!(all.body, "alt.x=0&alt.y=0&go.x=0&go.y=0&q=term");

        let one = form.submission(Some("go"), None).unwrap();
        assert_eq!(one.body, "go.x=0&go.y=0&q=term");
    }

    #[test]
    fn select_skips_options_without_value() {
        let html = r#"<form>
            <select name="s">
                <option>placeholder</option>
                <option value="x">X</option>
            </select>
        </form>"#;
        let form = page(html).form("form").unwrap();
        assert_eq!(form.num_options("s").unwrap(), 1);
        assert_eq!(form.elements["s"].value.as_ref().unwrap().value, "x");
    }

    #[test]
    fn set_force_injects_hidden_element() {
        let mut form = page(LOGIN_FORM).form("form").unwrap();
        form.set_force("extra", "1").unwrap();
        assert_eq!(form.elements["extra"].kind, ElementKind::Hidden);
        let sub = form.submission(None, None).unwrap();
        assert!(sub.pairs.contains_key("extra"));
    }

    #[test]
    fn transcoded_values_are_percent_encoded_bytes() {
        let html = r#"<form method="post"><input name="q" value="テスト"></form>"#;
        let form = page(html).form("form").unwrap();
        let sub = form
            .submission(None, Some(encoding_rs::SHIFT_JIS))
            .unwrap();
        // Shift_JIS bytes of テスト: 83 65 83 58 83 67
        assert_eq!(sub.body, "q=%83e%83X%83g");
    }

    #[test]
    fn values_are_form_escaped() {
        let html = r#"<form><input name="q" value="a b&c"></form>"#;
        let form = page(html).form("form").unwrap();
        let sub = form.submission(None, None).unwrap();
        assert_eq!(sub.body, "q=a+b%26c");
    }
}
